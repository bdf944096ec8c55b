/// Longueur max d'un label DNS (octets).
const MAX_LABEL_LEN: usize = 63;

/// Convertit `domain` en IDNA puis vérifie chaque label.
/// Les raisons invalidantes sont ajoutées à `reasons`.
pub(crate) fn check_domain(domain: &str, reasons: &mut Vec<String>) {
    let Ok(ascii) = idna::domain_to_ascii(domain.trim_end_matches('.')) else {
        reasons.push(format!("domain '{domain}' is not a valid IDNA name"));
        return;
    };
    if ascii.is_empty() {
        reasons.push("domain is empty".to_string());
        return;
    }
    if !ascii.contains('.') {
        reasons.push(format!("domain '{ascii}' has no dot"));
    }
    reasons.extend(ascii.split('.').filter_map(label_problem));
}

fn label_problem(label: &str) -> Option<String> {
    if label.is_empty() {
        Some("empty domain label".to_string())
    } else if label.len() > MAX_LABEL_LEN {
        Some(format!("label '{label}' is longer than {MAX_LABEL_LEN}"))
    } else if label.starts_with('-') || label.ends_with('-') {
        Some(format!("label '{label}' starts or ends with '-'"))
    } else if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        Some(format!("label '{label}' has characters outside [a-z0-9-]"))
    } else {
        None
    }
}

/// Renvoie `(domaine en minuscules, domaine ASCII)`. La forme ASCII est
/// vide si la conversion IDNA échoue.
pub(crate) fn normalize_domain(domain: &str) -> (String, String) {
    let lower = domain.trim().trim_end_matches('.').to_lowercase();
    let ascii = idna::domain_to_ascii(&lower).unwrap_or_default();
    (lower, ascii)
}
