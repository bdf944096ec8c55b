use async_trait::async_trait;

use super::{MxError, MxRecord, MxStatus};

/// Source des réponses MX. Partagée entre livraisons concurrentes:
/// l'implémentation doit être réentrante.
#[async_trait]
pub trait MxLookup: Send + Sync {
    /// Enregistrements MX bruts d'un domaine ASCII, dans n'importe quel ordre.
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxError>;
}

/// Interroge `domain` et renvoie ses enregistrements triés par préférence
/// croissante, sans doublons.
pub async fn resolve_mx_hosts<R>(resolver: &R, domain: &str) -> Result<MxStatus, MxError>
where
    R: MxLookup + ?Sized,
{
    let ascii = normalize_domain(domain)?;
    let mut records = resolver.lookup_mx(&ascii).await?;

    records.sort();
    records.dedup();

    if records.is_empty() {
        Ok(MxStatus::NoRecords)
    } else {
        Ok(MxStatus::Records(records))
    }
}

pub fn normalize_domain(domain: &str) -> Result<String, MxError> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(MxError::EmptyDomain);
    }
    idna::domain_to_ascii(trimmed).map_err(MxError::idna)
}

#[cfg_attr(not(feature = "with-dns"), allow(dead_code))]
pub(crate) fn normalize_exchange(exchange: String) -> String {
    let trimmed = exchange.trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}

#[cfg(feature = "with-dns")]
pub use dns::DnsMxResolver;

#[cfg(feature = "with-dns")]
mod dns {
    use async_trait::async_trait;
    use trust_dns_resolver::TokioAsyncResolver;
    use trust_dns_resolver::error::ResolveErrorKind;

    use super::{MxError, MxLookup, MxRecord, normalize_exchange};

    /// [`MxLookup`] via la configuration DNS du système.
    #[derive(Clone)]
    pub struct DnsMxResolver {
        resolver: TokioAsyncResolver,
    }

    impl DnsMxResolver {
        pub fn from_system_conf() -> Result<Self, MxError> {
            let resolver =
                TokioAsyncResolver::tokio_from_system_conf().map_err(MxError::resolver_init)?;
            Ok(Self { resolver })
        }
    }

    #[async_trait]
    impl MxLookup for DnsMxResolver {
        async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxError> {
            let lookup = match self.resolver.mx_lookup(domain).await {
                Ok(lookup) => lookup,
                Err(err) if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                    return Ok(Vec::new());
                }
                Err(err) => return Err(MxError::lookup(domain, err)),
            };
            Ok(lookup
                .iter()
                .map(|mx| MxRecord::new(mx.preference(), normalize_exchange(mx.exchange().to_utf8())))
                .collect())
        }
    }
}
