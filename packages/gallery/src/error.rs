//! Errors raised while fetching gallery records.
//!
//! These never escape the gallery loader: every variant is logged and turned
//! into an empty gallery.

/// What went wrong with the records request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The request never produced a response.
    Network,
    /// The endpoint answered with a non-success status.
    Status(u16),
    /// The response body could not be read.
    Body,
    /// The body was read but could not be decoded.
    Decode,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchErrorKind::Network => write!(f, "network"),
            FetchErrorKind::Status(code) => write!(f, "status {}", code),
            FetchErrorKind::Body => write!(f, "body"),
            FetchErrorKind::Decode => write!(f, "decode"),
        }
    }
}

/// Structured error for a failed records fetch.
#[derive(Debug)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: FetchErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn status(code: u16, url: &str) -> Self {
        Self::new(FetchErrorKind::Status(code), format!("{} answered {}", url, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = FetchError::with_source(FetchErrorKind::Network, "request failed", io);
        let text = err.to_string();
        assert!(text.starts_with("[network] request failed"));
        assert!(text.contains("refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_status_error() {
        let err = FetchError::status(502, "/api/records");
        assert_eq!(err.kind, FetchErrorKind::Status(502));
        assert_eq!(err.to_string(), "[status 502] /api/records answered 502");
    }
}
