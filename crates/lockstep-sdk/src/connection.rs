use std::fmt;
use std::str::FromStr;

use crate::error::ConnectionStringError;

/// Parsed `Endpoint=...;SharedAccessKey=...` connection string.
///
/// Segment keys are case-insensitive and may appear in any order. Unknown
/// segments are ignored.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub endpoint: String,
    pub shared_access_key: Option<String>,
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ConnectionStringError::Empty);
        }

        let mut endpoint = None;
        let mut shared_access_key = None;

        for segment in s.split(';').map(str::trim).filter(|seg| !seg.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::MalformedSegment(segment.to_string()))?;
            let value = value.trim();

            if key.trim().eq_ignore_ascii_case("endpoint") {
                endpoint = Some(value.trim_end_matches('/').to_string());
            } else if key.trim().eq_ignore_ascii_case("sharedaccesskey") {
                shared_access_key = (!value.is_empty()).then(|| value.to_string());
            }
        }

        let endpoint = endpoint.ok_or(ConnectionStringError::MissingEndpoint)?;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConnectionStringError::InvalidEndpoint(endpoint));
        }

        Ok(Self {
            endpoint,
            shared_access_key,
        })
    }
}

// Keep the key out of logs.
impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint)
            .field(
                "shared_access_key",
                &self.shared_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
