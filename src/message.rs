//! The inbound message, parsed once per transaction.

use mailparse::{MailHeaderMap, MailParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message is empty")]
    Empty,
    #[error("message headers could not be parsed: {source}")]
    Headers {
        #[source]
        source: MailParseError,
    },
}

/// Raw message bytes plus the header fields worth reporting.
///
/// The bytes are relayed untouched; only the header block is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardMessage {
    raw: Vec<u8>,
    message_id: Option<String>,
    subject: Option<String>,
}

impl ForwardMessage {
    pub fn parse(raw: impl Into<Vec<u8>>) -> Result<Self, MessageError> {
        let raw = raw.into();
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(MessageError::Empty);
        }
        let (headers, _body_offset) =
            mailparse::parse_headers(&raw).map_err(|source| MessageError::Headers { source })?;
        let message_id = headers.get_first_value("Message-ID");
        let subject = headers.get_first_value("Subject");
        Ok(Self {
            raw,
            message_id,
            subject,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_headers_and_keeps_bytes() {
        let raw = b"Message-ID: <1@alias-domain.com>\r\nSubject: Hello\r\n\r\nBody\r\n";
        let message = ForwardMessage::parse(raw.to_vec()).expect("parses");
        assert_eq!(message.message_id(), Some("<1@alias-domain.com>"));
        assert_eq!(message.subject(), Some("Hello"));
        assert_eq!(message.as_bytes(), raw);
    }

    #[test]
    fn missing_headers_are_none() {
        let message = ForwardMessage::parse(b"From: a@b.com\r\n\r\nhi\r\n".to_vec()).unwrap();
        assert!(message.subject().is_none());
        assert!(message.message_id().is_none());
    }

    #[test]
    fn blank_message_is_rejected() {
        assert!(matches!(
            ForwardMessage::parse(b"\r\n".to_vec()),
            Err(MessageError::Empty)
        ));
    }
}
