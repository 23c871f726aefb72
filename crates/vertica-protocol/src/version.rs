//! Protocol and server version definitions.

use core::fmt;

/// Frontend/backend protocol version.
///
/// Encoded on the wire as `major << 16 | minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion(i32);

impl ProtocolVersion {
    /// Protocol 3.0, the only version this client speaks.
    pub const V3_0: Self = Self(3 << 16);

    /// Create from the raw wire value.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Get the raw wire value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Major version number.
    #[must_use]
    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Minor version number.
    #[must_use]
    pub const fn minor(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V3_0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// Server product version, as reported in the `server_version` parameter.
///
/// The integer form is `major * 10000 + minor * 100 + patch`, so `"8.0"`
/// is `80000` and `"v12.0.4-0"` is `120004`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ServerVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch level.
    pub patch: u32,
}

impl ServerVersion {
    /// Parse a version string such as `8.0`, `7.1.2` or `v24.1.0-20240315`.
    ///
    /// A leading `v` and anything after the first character that is neither
    /// a digit nor a dot are ignored. Returns `None` if no major number is present.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix(['v', 'V']).unwrap_or(s);
        let end = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());

        let mut parts = s[..end].split('.').filter(|p| !p.is_empty());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Integer form (`major * 10000 + minor * 100 + patch`).
    #[must_use]
    pub const fn as_number(self) -> u32 {
        self.major * 10_000 + self.minor * 100 + self.patch
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
