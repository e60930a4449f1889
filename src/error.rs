use std::fmt;

/// Main error type for the rumor gossip node
#[derive(Debug)]
pub enum RumorError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Caller misused the broadcast protocol (nested broadcast, non-envelope receive)
    ProtocolMisuse(String),

    /// A correlated response does not belong to the pending request's type
    TypeMismatch {
        request_type: String,
        response_type: String,
    },

    /// Transport layer errors
    Transport(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Serialization/deserialization errors
    Serialization(SerializationError),

    /// Internal lock poisoning or concurrency errors
    Concurrency(String),
}

/// Serialization related errors
#[derive(Debug)]
pub enum SerializationError {
    /// Binary encoding errors
    Encode(bincode::error::EncodeError),

    /// Binary decoding errors
    Decode(bincode::error::DecodeError),
}

impl fmt::Display for RumorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RumorError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RumorError::ProtocolMisuse(msg) => write!(f, "Protocol misuse: {}", msg),
            RumorError::TypeMismatch {
                request_type,
                response_type,
            } => write!(
                f,
                "Type mismatch: response {} does not correlate with request {}",
                response_type, request_type
            ),
            RumorError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RumorError::Io(err) => write!(f, "I/O error: {}", err),
            RumorError::Serialization(err) => write!(f, "Serialization error: {}", err),
            RumorError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::Encode(err) => write!(f, "Encode: {}", err),
            SerializationError::Decode(err) => write!(f, "Decode: {}", err),
        }
    }
}

impl std::error::Error for RumorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RumorError::Io(err) => Some(err),
            RumorError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializationError::Encode(err) => Some(err),
            SerializationError::Decode(err) => Some(err),
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, RumorError>;

impl RumorError {
    /// Get the error type identifier, used as a structured log field
    pub fn error_type(&self) -> &'static str {
        match self {
            RumorError::Config(_) => "configuration_error",
            RumorError::ProtocolMisuse(_) => "protocol_misuse",
            RumorError::TypeMismatch { .. } => "type_mismatch",
            RumorError::Transport(_) => "transport_error",
            RumorError::Io(_) => "io_error",
            RumorError::Serialization(_) => "serialization_error",
            RumorError::Concurrency(_) => "concurrency_error",
        }
    }

    /// Caller-fault errors are never worth retrying
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, RumorError::ProtocolMisuse(_))
    }
}

// Conversions from common error types
impl From<std::io::Error> for RumorError {
    fn from(err: std::io::Error) -> Self {
        RumorError::Io(err)
    }
}

impl From<bincode::error::EncodeError> for RumorError {
    fn from(err: bincode::error::EncodeError) -> Self {
        RumorError::Serialization(SerializationError::Encode(err))
    }
}

impl From<bincode::error::DecodeError> for RumorError {
    fn from(err: bincode::error::DecodeError) -> Self {
        RumorError::Serialization(SerializationError::Decode(err))
    }
}

impl From<SerializationError> for RumorError {
    fn from(err: SerializationError) -> Self {
        RumorError::Serialization(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for RumorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        RumorError::Concurrency(format!("Lock poisoned: {}", err))
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::RumorError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RumorError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! protocol_error {
    ($msg:expr) => {
        $crate::error::RumorError::ProtocolMisuse($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RumorError::ProtocolMisuse(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::RumorError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RumorError::Transport(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = RumorError::Config("Invalid fanout".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: Invalid fanout");

        let io_err = RumorError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        assert!(io_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let err = RumorError::TypeMismatch {
            request_type: "PingRequest".to_string(),
            response_type: "PeerNeighborsResponse".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("PingRequest"));
        assert!(msg.contains("PeerNeighborsResponse"));
        assert_eq!(err.error_type(), "type_mismatch");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let rumor_err: RumorError = io_err.into();

        assert!(matches!(rumor_err, RumorError::Io(_)));
    }

    #[test]
    fn test_macros() {
        let err = config_error!("Fanout {} is invalid", 0);
        assert_eq!(err.to_string(), "Configuration error: Fanout 0 is invalid");

        let err = protocol_error!("already an envelope");
        assert!(err.is_caller_fault());
        assert_eq!(err.to_string(), "Protocol misuse: already an envelope");

        let err = transport_error!("No route to {}", "peer");
        assert_eq!(err.error_type(), "transport_error");
    }
}
