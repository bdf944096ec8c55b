use std::fmt;

use super::TransportError;

/// Réponse SMTP complète (éventuellement multi-lignes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn new(code: u16, line: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![line.into()],
        }
    }

    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_positive_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn is_transient_failure(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// Recherche d'un mot-clé EHLO, insensible à la casse, sur le premier
    /// mot de chaque ligne.
    pub fn has_capability(&self, cap: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(cap))
        })
    }

    pub fn message(&self) -> String {
        self.lines.join(" ")
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message())
    }
}

/// Découpe une ligne de réponse en `(code, dernière, texte)`.
pub(crate) fn parse_reply_line(line: &str) -> Result<(u16, bool, &str), TransportError> {
    if line.len() < 3 || !line.is_char_boundary(3) {
        return Err(TransportError::protocol(format!("invalid reply: {line}")));
    }
    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| TransportError::protocol(format!("invalid code in line: {line}")))?;
    if !(200..600).contains(&code) {
        return Err(TransportError::protocol(format!("reply code out of range: {line}")));
    }
    let is_last = line.as_bytes().get(3) != Some(&b'-');
    let text = line.get(4..).unwrap_or("");
    Ok((code, is_last, text))
}

/// Accumule les lignes jusqu'à la dernière.
#[derive(Debug, Default)]
pub(crate) struct ReplyBuilder {
    code: Option<u16>,
    lines: Vec<String>,
}

impl ReplyBuilder {
    /// Ajoute une ligne; renvoie la réponse complète après la dernière.
    pub(crate) fn push(&mut self, line: &str) -> Result<Option<SmtpReply>, TransportError> {
        let (code, is_last, text) = parse_reply_line(line)?;
        match self.code {
            Some(existing) if existing != code => {
                return Err(TransportError::protocol(format!(
                    "inconsistent reply codes: {existing} vs {code}"
                )));
            }
            Some(_) => {}
            None => self.code = Some(code),
        }
        self.lines.push(text.to_string());
        if is_last {
            Ok(Some(SmtpReply {
                code,
                lines: std::mem::take(&mut self.lines),
            }))
        } else {
            Ok(None)
        }
    }
}
