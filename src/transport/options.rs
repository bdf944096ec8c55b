use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sécurisation de la connexion sortante.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// STARTTLS si le serveur l'annonce.
    #[default]
    Auto,
    /// Refuse d'envoyer sans STARTTLS réussi.
    StartTls,
    /// Texte clair uniquement.
    None,
}

/// Réglages communs à toutes les connexions SMTP sortantes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub helo_domain: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            helo_domain: "localhost".to_string(),
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
        }
    }
}

impl TransportOptions {
    /// Nom envoyé avec `EHLO`, `localhost` si vide.
    pub fn helo_name(&self) -> &str {
        let trimmed = self.helo_domain.trim();
        if trimmed.is_empty() { "localhost" } else { trimmed }
    }
}
