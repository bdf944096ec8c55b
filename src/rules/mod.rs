//! Alias rules and first-match-wins matching.
//!
//! A [`RuleSet`] is built once from configuration and shared read-only by
//! every transaction; [`RuleSet::find`] is a plain ordered scan with early
//! exit.

mod error;
mod types;

pub use error::RuleError;
pub use types::{AliasRule, RuleSet};

#[cfg(test)]
mod tests;
