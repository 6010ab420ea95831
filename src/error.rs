//! Error types shared by the builder, the codec and the conversation engine.

use thiserror::Error;

/// Every failure the crate can report.
///
/// Builder and codec failures are synchronous. Conversation failures are
/// recorded once per stream and handed to every waiter that asks for them,
/// which is why the type is `Clone`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MishmashError {
    /// Malformed caller input, such as a mismatched scope name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not legal in the current builder scope or conversation state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The peer sent something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A string field could not be parsed into its typed form.
    #[error("bad format for field {field}: '{value}', error: {reason}")]
    FieldFormat {
        field: String,
        value: String,
        reason: String,
    },

    /// The peer did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Recognised but unsupported feature.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// The underlying byte stream or channel failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Error reported by the remote side of the conversation.
    #[error("peer error [{code}]: {message}")]
    Peer {
        code: u32,
        message: String,
        additional_info: Vec<String>,
    },
}

impl MishmashError {
    /// Returns the wire code for this error.
    ///
    /// Peer errors keep the code the remote side sent, if it is a known one.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::Protocol(_) | Self::FieldFormat { .. } => ErrorCode::Protocol,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Unimplemented(_) => ErrorCode::Unimplemented,
            Self::Internal(_) => ErrorCode::Internal,
            Self::Transport(_) => ErrorCode::Transport,
            Self::Peer { code, .. } => ErrorCode::from_u32(*code).unwrap_or(ErrorCode::Internal),
        }
    }

    /// Distinguishes "peer too slow" from "peer misbehaved".
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.code() == ErrorCode::Timeout
    }

    pub(crate) fn field_format(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::FieldFormat {
            field: field.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Numeric error codes carried by `Error` messages on the wire.
///
/// Codes are grouped by category:
/// - 1-9: caller errors
/// - 10-19: protocol errors
/// - 20-29: runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    InvalidArgument = 1,
    InvalidState = 2,
    Unimplemented = 3,
    Protocol = 10,
    Timeout = 11,
    Internal = 20,
    Transport = 21,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::InvalidArgument),
            2 => Some(Self::InvalidState),
            3 => Some(Self::Unimplemented),
            10 => Some(Self::Protocol),
            11 => Some(Self::Timeout),
            20 => Some(Self::Internal),
            21 => Some(Self::Transport),
            _ => None,
        }
    }

    /// Checks if the code blames the peer's messages (10-19).
    #[must_use]
    pub const fn is_protocol_error(self) -> bool {
        matches!(self.as_u32(), 10..=19)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::InvalidState => write!(f, "invalid_state"),
            Self::Unimplemented => write!(f, "unimplemented"),
            Self::Protocol => write!(f, "protocol"),
            Self::Timeout => write!(f, "timeout"),
            Self::Internal => write!(f, "internal"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_roundtrip() {
        let codes = [
            ErrorCode::InvalidArgument,
            ErrorCode::InvalidState,
            ErrorCode::Unimplemented,
            ErrorCode::Protocol,
            ErrorCode::Timeout,
            ErrorCode::Internal,
            ErrorCode::Transport,
        ];

        for code in codes {
            assert_eq!(ErrorCode::from_u32(code.as_u32()), Some(code));
        }
        assert_eq!(ErrorCode::from_u32(99), None);
    }

    #[test]
    fn field_format_is_a_protocol_error() {
        let err = MishmashError::field_format("DATE VALUE", "yesterday", "input contains invalid characters");

        assert_eq!(err.code(), ErrorCode::Protocol);
        assert!(err.code().is_protocol_error());
        assert_eq!(
            err.to_string(),
            "bad format for field DATE VALUE: 'yesterday', error: input contains invalid characters"
        );
    }

    #[test]
    fn peer_error_keeps_remote_code() {
        let err = MishmashError::Peer {
            code: ErrorCode::Timeout.as_u32(),
            message: "setup not received".to_string(),
            additional_info: vec![],
        };
        assert!(err.is_timeout());

        let unknown = MishmashError::Peer {
            code: 4242,
            message: "?".to_string(),
            additional_info: vec![],
        };
        assert_eq!(unknown.code(), ErrorCode::Internal);
    }
}
