//! Error handling for the hazard relay.

/// A specialized `Result` type for hazard relay operations.
pub type Result<T> = std::result::Result<T, HazardError>;

/// The main error type for the hazard relay.
#[derive(Debug, thiserror::Error)]
pub enum HazardError {
    /// Reading is incomplete or carries a non-finite value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serial frame could not be parsed
    #[error("Malformed line {line:?}: {reason}")]
    MalformedLine { line: String, reason: String },

    /// Serial device disconnected, timed out or refused a write
    #[error("Device I/O error: {0}")]
    DeviceIo(String),

    /// Reading store read or write failed
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Feed fetch or command delivery over the network failed
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Actuator command could not be delivered
    #[error("Command error: {0}")]
    Command(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HazardError {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new malformed line error
    pub fn malformed(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Create a new device I/O error
    pub fn device_io(msg: impl Into<String>) -> Self {
        Self::DeviceIo(msg.into())
    }

    /// Create a new transient network error
    pub fn network_error(msg: impl Into<String>) -> Self {
        Self::TransientNetwork(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new command error
    pub fn command_error(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Whether the error must stop the owning task instead of being retried
    /// on the next cycle.
    ///
    /// Device errors only reach a caller once the ingestion retry bound is
    /// exhausted, so they are fatal here.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::DeviceIo(_))
    }

    /// Whether the error is a dropped-frame condition.
    pub fn is_rejected_input(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::MalformedLine { .. })
    }
}

impl From<reqwest::Error> for HazardError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransientNetwork(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(HazardError::config_error("missing co limit").is_fatal());
        assert!(HazardError::device_io("port gone").is_fatal());
        assert!(!HazardError::network_error("refused").is_fatal());
        assert!(!HazardError::validation("CO missing").is_fatal());
        assert!(!HazardError::command_error("write timed out").is_fatal());
    }

    #[test]
    fn malformed_line_keeps_raw_input() {
        let err = HazardError::malformed("LPG:12,CH4:oops", "CH4 is not numeric");
        let text = err.to_string();
        assert!(text.contains("LPG:12,CH4:oops"));
        assert!(text.contains("CH4 is not numeric"));
        assert!(err.is_rejected_input());
    }
}
