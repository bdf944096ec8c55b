use std::fmt;

/// Une réponse MX. L'ordre suit d'abord la préférence: trier une liste met
/// l'échangeur préféré en tête.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

impl fmt::Display for MxRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.preference, self.exchange)
    }
}

/// Réponse pour un domaine, triée par préférence croissante.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxStatus {
    Records(Vec<MxRecord>),
    NoRecords,
}

impl MxStatus {
    pub fn records(&self) -> &[MxRecord] {
        match self {
            Self::Records(records) => records,
            Self::NoRecords => &[],
        }
    }

    /// L'échangeur à utiliser, s'il existe.
    pub fn preferred_host(&self) -> Option<&str> {
        self.records().first().map(|r| r.exchange.as_str())
    }

    /// Noms des échangeurs, le préféré en premier.
    pub fn hosts(&self) -> Vec<String> {
        self.records().iter().map(|r| r.exchange.clone()).collect()
    }
}
