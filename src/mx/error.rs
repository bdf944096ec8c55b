use thiserror::Error;

#[derive(Debug, Error)]
pub enum MxError {
    #[error("domain is empty")]
    EmptyDomain,
    #[error("domain IDNA conversion failed")]
    IdnaConversion {
        #[source]
        source: idna::Errors,
    },
    #[cfg(feature = "with-dns")]
    #[error("resolver initialization failed: {source}")]
    ResolverInit {
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },
    #[cfg(feature = "with-dns")]
    #[error("MX lookup for {domain} failed: {source}")]
    Lookup {
        domain: String,
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },
    /// Échec remonté par une implémentation [`MxLookup`](super::MxLookup)
    /// autre que le DNS.
    #[error("MX lookup for {domain} failed: {reason}")]
    Other { domain: String, reason: String },
}

impl MxError {
    pub(crate) fn idna(source: idna::Errors) -> Self {
        Self::IdnaConversion { source }
    }

    #[cfg(feature = "with-dns")]
    pub(crate) fn resolver_init(source: trust_dns_resolver::error::ResolveError) -> Self {
        Self::ResolverInit { source }
    }

    #[cfg(feature = "with-dns")]
    pub(crate) fn lookup(domain: &str, source: trust_dns_resolver::error::ResolveError) -> Self {
        Self::Lookup {
            domain: domain.to_string(),
            source,
        }
    }

    pub fn other(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Other {
            domain: domain.into(),
            reason: reason.into(),
        }
    }
}
