use thiserror::Error;

/// One inbound SMTP command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Helo { extended: bool, domain: String },
    Mail { sender: String, size: Option<usize> },
    Rcpt { recipient: String },
    Data,
    Rset,
    Noop,
    Quit,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum SyntaxError {
    #[error("missing domain")]
    MissingDomain,
    #[error("expected {expected}")]
    Path { expected: &'static str },
    #[error("bad SIZE parameter")]
    Size,
}

impl Command {
    pub(crate) fn parse(line: &str) -> Result<Self, SyntaxError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "EHLO" | "HELO" => {
                if rest.is_empty() {
                    return Err(SyntaxError::MissingDomain);
                }
                Ok(Self::Helo {
                    extended: verb.eq_ignore_ascii_case("EHLO"),
                    domain: rest.to_string(),
                })
            }
            "MAIL" => {
                let (sender, params) = parse_path(rest, "FROM:")?;
                Ok(Self::Mail {
                    sender,
                    size: size_param(params)?,
                })
            }
            "RCPT" => {
                let (recipient, _) = parse_path(rest, "TO:")?;
                if recipient.is_empty() {
                    return Err(SyntaxError::Path {
                        expected: "TO:<address>",
                    });
                }
                Ok(Self::Rcpt { recipient })
            }
            "DATA" => Ok(Self::Data),
            "RSET" => Ok(Self::Rset),
            "NOOP" => Ok(Self::Noop),
            "QUIT" => Ok(Self::Quit),
            _ => Ok(Self::Unknown(verb.to_string())),
        }
    }
}

/// Splits `FROM:<path> params` into the bare path and the parameter string.
fn parse_path<'a>(rest: &'a str, keyword: &'static str) -> Result<(String, &'a str), SyntaxError> {
    let expected = if keyword == "FROM:" {
        "FROM:<address>"
    } else {
        "TO:<address>"
    };
    let head = rest.get(..keyword.len()).ok_or(SyntaxError::Path { expected })?;
    if !head.eq_ignore_ascii_case(keyword) {
        return Err(SyntaxError::Path { expected });
    }
    let rest = rest[keyword.len()..].trim_start();

    if let Some(inner) = rest.strip_prefix('<') {
        let end = inner.find('>').ok_or(SyntaxError::Path { expected })?;
        Ok((inner[..end].trim().to_string(), inner[end + 1..].trim()))
    } else {
        // Some clients omit the angle brackets.
        let (path, params) = rest.split_once(' ').unwrap_or((rest, ""));
        if path.is_empty() {
            return Err(SyntaxError::Path { expected });
        }
        Ok((path.to_string(), params.trim()))
    }
}

fn size_param(params: &str) -> Result<Option<usize>, SyntaxError> {
    for param in params.split_whitespace() {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.eq_ignore_ascii_case("SIZE") {
            return value.parse().map(Some).map_err(|_| SyntaxError::Size);
        }
    }
    Ok(None)
}
