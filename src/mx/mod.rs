//! Résolution MX.
//!
//! L'orchestrateur ne dépend que du trait [`MxLookup`]; la feature
//! `with-dns` fournit [`DnsMxResolver`], basé sur la configuration
//! résolveur du système.

mod error;
mod resolver;
mod types;

pub use error::MxError;
pub use resolver::{MxLookup, normalize_domain, resolve_mx_hosts};
#[cfg(feature = "with-dns")]
pub use resolver::DnsMxResolver;
pub use types::{MxRecord, MxStatus};
