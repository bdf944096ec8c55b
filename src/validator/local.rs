/// Caractères spéciaux `atext` (RFC 5322) autorisés dans un dot-atom.
const ATEXT_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || ATEXT_SPECIALS.contains(c)
}

/// Règles strictes: dot-atom, pas de '.' en tête, en fin ou doublé.
pub(crate) fn is_local_strict(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}

/// Règles souples: accepte aussi une chaîne entre guillemets (sans CR/LF).
pub(crate) fn is_local_relaxed(s: &str) -> bool {
    let quoted = s.len() >= 2 && s.starts_with('"') && s.ends_with('"');
    if quoted {
        !s.contains(['\r', '\n'])
    } else {
        is_local_strict(s)
    }
}
