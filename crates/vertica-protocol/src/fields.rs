//! Error and notice field sets (`E` / `N` message bodies).

use core::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{read_cstring, write_cstring};
use crate::error::ProtocolError;

/// Field type codes.
pub mod field {
    /// Severity (`ERROR`, `FATAL`, `WARNING`, `NOTICE`, ...).
    pub const SEVERITY: u8 = b'S';
    /// SQLSTATE code.
    pub const CODE: u8 = b'C';
    /// Primary message.
    pub const MESSAGE: u8 = b'M';
    /// Detail.
    pub const DETAIL: u8 = b'D';
    /// Hint.
    pub const HINT: u8 = b'H';
    /// Cursor position.
    pub const POSITION: u8 = b'P';
    /// Internal position.
    pub const INTERNAL_POSITION: u8 = b'p';
    /// Internal query.
    pub const INTERNAL_QUERY: u8 = b'q';
    /// Context.
    pub const WHERE: u8 = b'W';
    /// Source file.
    pub const FILE: u8 = b'F';
    /// Source line.
    pub const LINE: u8 = b'L';
    /// Source routine.
    pub const ROUTINE: u8 = b'R';
}

/// Ordered field list of an `ErrorResponse` or `NoticeResponse`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFields {
    fields: Vec<(u8, String)>,
}

impl ServerFields {
    /// Build a field set from a severity, SQLSTATE and message.
    #[must_use]
    pub fn new(severity: &str, code: &str, message: &str) -> Self {
        Self::default()
            .with(field::SEVERITY, severity)
            .with(field::CODE, code)
            .with(field::MESSAGE, message)
    }

    /// Append a field.
    #[must_use]
    pub fn with(mut self, kind: u8, value: impl Into<String>) -> Self {
        self.fields.push((kind, value.into()));
        self
    }

    /// Look up a field by type code.
    #[must_use]
    pub fn get(&self, kind: u8) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_str())
    }

    /// Severity, if reported.
    #[must_use]
    pub fn severity(&self) -> Option<&str> {
        self.get(field::SEVERITY)
    }

    /// SQLSTATE code, if reported.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.get(field::CODE)
    }

    /// Primary message, empty if the server omitted it.
    #[must_use]
    pub fn message(&self) -> &str {
        self.get(field::MESSAGE).unwrap_or_default()
    }

    /// Iterate all fields in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub(crate) fn decode(mut body: Bytes, context: &'static str) -> Result<Self, ProtocolError> {
        let mut fields = Vec::new();
        while let Some(&kind) = body.first() {
            if kind == 0 {
                break;
            }
            body = body.slice(1..);
            fields.push((kind, read_cstring(&mut body, context)?));
        }
        Ok(Self { fields })
    }

    pub(crate) fn encode_body(&self, dst: &mut BytesMut) {
        for (kind, value) in &self.fields {
            dst.put_u8(*kind);
            write_cstring(dst, value);
        }
        dst.put_u8(0);
    }
}

/// Renders as `SEVERITY:  message`, with the detail and hint on their own
/// lines when present.
impl fmt::Display for ServerFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity() {
            Some(severity) => write!(f, "{severity}:  {}", self.message())?,
            None => f.write_str(self.message())?,
        }
        if let Some(detail) = self.get(field::DETAIL) {
            write!(f, "\nDETAIL:  {detail}")?;
        }
        if let Some(hint) = self.get(field::HINT) {
            write!(f, "\nHINT:  {hint}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fields() {
        let body = Bytes::from_static(b"SFATAL\0C28000\0Mpassword authentication failed\0\0");
        let fields = ServerFields::decode(body, "ErrorResponse").unwrap();
        assert_eq!(fields.severity(), Some("FATAL"));
        assert_eq!(fields.code(), Some("28000"));
        assert_eq!(fields.message(), "password authentication failed");
        assert_eq!(
            fields.to_string(),
            "FATAL:  password authentication failed"
        );
    }

    #[test]
    fn test_display_with_detail_and_hint() {
        let fields = ServerFields::new("ERROR", "3D000", "database \"x\" does not exist")
            .with(field::DETAIL, "no such catalog")
            .with(field::HINT, "check dbname");
        assert_eq!(
            fields.to_string(),
            "ERROR:  database \"x\" does not exist\nDETAIL:  no such catalog\nHINT:  check dbname"
        );
    }

    #[test]
    fn test_missing_message_is_empty() {
        let fields = ServerFields::default().with(field::SEVERITY, "NOTICE");
        assert_eq!(fields.message(), "");
    }
}
