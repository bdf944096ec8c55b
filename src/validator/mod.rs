//! Vérification syntaxique des adresses.
//!
//! Sert à valider les destinations des alias à la compilation des règles
//! et les adresses d'enveloppe reçues par le serveur entrant.

mod domain;
mod local;
mod types;

pub use types::{EmailError, Mailbox, NormalizedEmail, ValidationMode, ValidationReport};

use domain::{check_domain, normalize_domain};
use local::{is_local_relaxed, is_local_strict};

/// Limite RFC 5321, `@` compris.
const MAX_ADDRESS_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;

pub fn validate_email(email: &str, mode: ValidationMode) -> Result<ValidationReport, EmailError> {
    let input = email.trim();

    let mut reasons = Vec::new();

    if input.len() > MAX_ADDRESS_LEN {
        reasons.push(format!("total length {} > {MAX_ADDRESS_LEN}", input.len()));
    }

    let Some((local, domain)) = split_address(input) else {
        reasons.push("must contain exactly one '@'".to_string());
        return Ok(ValidationReport { ok: false, reasons });
    };

    if local.is_empty() || local.len() > MAX_LOCAL_LEN {
        reasons.push(format!(
            "local part length {} invalid (1..={MAX_LOCAL_LEN})",
            local.len()
        ));
    }

    check_domain(domain, &mut reasons);

    let local_ok = match mode {
        ValidationMode::Strict => is_local_strict(local),
        ValidationMode::Relaxed => is_local_relaxed(local),
    };
    if !local_ok {
        reasons.push(match mode {
            ValidationMode::Strict => "invalid local part (strict rules)".into(),
            ValidationMode::Relaxed => "invalid local part (relaxed rules)".into(),
        });
    }

    Ok(ValidationReport {
        ok: reasons.is_empty(),
        reasons,
    })
}

/// Valide puis renvoie l'adresse décomposée (partie locale, domaine en
/// minuscules, domaine ASCII).
pub fn normalize_email(email: &str, mode: ValidationMode) -> Result<NormalizedEmail, EmailError> {
    let input = email.trim();
    let (local, domain) = split_address(input).unwrap_or(("", ""));

    let ValidationReport { ok, reasons } = validate_email(email, mode)?;
    let (domain_lower, ascii_domain) = normalize_domain(domain);

    Ok(NormalizedEmail {
        original: email.to_string(),
        local: local.to_string(),
        domain: domain_lower,
        ascii_domain,
        mode,
        valid: ok,
        reasons,
    })
}

/// Coupe sur l'unique `@`. Pas de `@` dans une partie locale entre guillemets.
fn split_address(input: &str) -> Option<(&str, &str)> {
    let (local, domain) = input.split_once('@')?;
    if domain.contains('@') {
        return None;
    }
    Some((local, domain))
}
