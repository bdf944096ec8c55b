use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Niveau d'exigence sur la partie locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Dot-atom uniquement.
    Strict,
    /// Dot-atom ou chaîne entre guillemets.
    Relaxed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub ok: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEmail {
    pub original: String,
    pub local: String,
    pub domain: String,
    pub ascii_domain: String,
    pub mode: ValidationMode,
    pub valid: bool,
    pub reasons: Vec<String>,
}

/// Adresse `local@domaine` syntaxiquement valide.
///
/// Le domaine est stocké en ASCII minuscule (IDNA appliqué): utilisable tel
/// quel pour le DNS et comme clé de regroupement. La partie locale est
/// conservée telle quelle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox {
    local: String,
    domain: String,
}

impl Mailbox {
    /// Valide `address` selon `mode` et construit la [`Mailbox`].
    pub fn parse(address: &str, mode: ValidationMode) -> Result<Self, EmailError> {
        let normalized = super::normalize_email(address, mode)?;
        if !normalized.valid {
            return Err(EmailError::invalid(address, normalized.reasons));
        }
        Ok(Self {
            local: normalized.local,
            domain: normalized.ascii_domain,
        })
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Adresse complète, telle qu'envoyée dans l'enveloppe SMTP.
    pub fn address(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }

    /// Identité insensible à la casse, pour la déduplication.
    pub fn key(&self) -> String {
        self.address().to_lowercase()
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("invalid address '{address}': {}", reasons.join("; "))]
    Invalid {
        address: String,
        reasons: Vec<String>,
    },
}

impl EmailError {
    pub(crate) fn invalid(address: &str, reasons: Vec<String>) -> Self {
        Self::Invalid {
            address: address.to_string(),
            reasons,
        }
    }
}
