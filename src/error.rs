//! Error types for the station protocol engine.
//!
//! Errors fall into three tiers that map onto how the engine reacts to them:
//!
//! - **Transport errors**: I/O failures on the packet channel. Fatal to the session.
//! - **Protocol errors**: a handshake or history-control exchange exhausted its
//!   retry bound. Fatal to the session.
//! - **Decode errors**: a single frame was malformed. Recoverable; the frame is
//!   logged and dropped at the loop boundary and never reaches the caller.
//!
//! Reconnection is the caller's job: on any fatal error, build a fresh session.
//!
//! ```rust
//! use wxlink::StationError;
//!
//! let error = StationError::protocol_exhausted("handshake", 3);
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::types::SessionState;

/// Result type alias for station operations.
pub type Result<T, E = StationError> = std::result::Result<T, E>;

/// Per-frame decode failures.
///
/// These never terminate a session; the loop that read the frame logs the error
/// and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame 0x{tag:02x} has wrong length: expected {expected} bytes, got {actual}")]
    WrongLength { tag: u8, expected: usize, actual: usize },

    #[error("frame 0x{tag:02x} failed checksum: computed {computed:#06x}, stored {stored:#06x}")]
    BadChecksum { tag: u8, computed: u16, stored: u16 },

    #[error("frame 0x{tag:02x} carries an invalid timestamp {bytes:02x?}")]
    BadTimestamp { tag: u8, bytes: [u8; 5] },

    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),
}

impl DecodeError {
    /// Tag of the frame that failed to decode.
    pub fn tag(&self) -> u8 {
        match self {
            DecodeError::WrongLength { tag, .. }
            | DecodeError::BadChecksum { tag, .. }
            | DecodeError::BadTimestamp { tag, .. } => *tag,
            DecodeError::UnknownTag(tag) => *tag,
        }
    }
}

/// Main error type for station operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StationError {
    #[error("Transport failure during {operation}")]
    Transport {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Protocol exchange '{stage}' failed after {attempts} attempts")]
    Protocol { stage: String, attempts: u32 },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Invalid configuration for '{field}': {details}")]
    Config { field: String, details: String },

    #[error("{transport} transport is not available in this build (enable the '{feature}' feature)")]
    UnsupportedTransport { transport: String, feature: String },

    #[error("Session is {state}, not ready for this operation")]
    NotReady { state: SessionState },

    #[error("Station task is no longer running")]
    Shutdown,

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl StationError {
    /// Returns whether rebuilding the session may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StationError::Transport { .. } => true,
            StationError::Protocol { .. } => true,
            StationError::Timeout { .. } => true,
            StationError::Decode(_) => false,
            StationError::Config { .. } => false,
            StationError::UnsupportedTransport { .. } => false,
            StationError::NotReady { .. } => false,
            StationError::Shutdown => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StationError::Transport { .. } => vec![
                "Check the logger is plugged in and powered",
                "Verify USB permissions for the device node",
                "Reconnect with a fresh session",
            ],
            StationError::Protocol { .. } => vec![
                "Power-cycle the logger console",
                "Increase the handshake attempt count",
                "Reconnect with a fresh session",
            ],
            StationError::Decode(_) => vec![
                "Check for electrical noise on the USB cable",
                "Enable frame logging to capture the offending bytes",
            ],
            StationError::Config { .. } => vec![
                "Check the option name and value range",
                "Fall back to the documented default",
            ],
            StationError::UnsupportedTransport { .. } => vec![
                "Rebuild with the required cargo feature",
                "Supply a custom PacketChannel implementation",
            ],
            StationError::NotReady { .. } => vec![
                "Complete the handshake before syncing or streaming",
                "Build a fresh station after a fatal error",
            ],
            StationError::Shutdown => vec![
                "Inspect the sample stream for the terminal error",
                "Start a new station connection",
            ],
            StationError::Timeout { .. } => vec![
                "Increase the timeout duration",
                "Check the station task is not blocked",
            ],
        }
    }

    /// Helper constructor for transport failures.
    pub fn transport(operation: impl Into<String>) -> Self {
        StationError::Transport { operation: operation.into(), source: None }
    }

    /// Helper constructor for transport failures with an underlying cause.
    pub fn transport_with_source(
        operation: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StationError::Transport { operation: operation.into(), source: Some(source) }
    }

    /// Helper constructor for exhausted protocol exchanges.
    pub fn protocol_exhausted(stage: impl Into<String>, attempts: u32) -> Self {
        StationError::Protocol { stage: stage.into(), attempts }
    }

    /// Helper constructor for configuration errors.
    pub fn config(field: impl Into<String>, details: impl Into<String>) -> Self {
        StationError::Config { field: field.into(), details: details.into() }
    }

    /// Helper constructor for transports compiled out of this build.
    pub fn unsupported_transport(transport: impl Into<String>, feature: impl Into<String>) -> Self {
        StationError::UnsupportedTransport { transport: transport.into(), feature: feature.into() }
    }
}

impl From<serde_yaml_ng::Error> for StationError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        StationError::Config { field: "<yaml>".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_error_messages_carry_the_tag(
                tag in any::<u8>(),
                expected in 1usize..256,
                actual in 0usize..256,
            ) {
                let error = DecodeError::WrongLength { tag, expected, actual };
                let message = error.to_string();
                let tag_hex = format!("0x{:02x}", tag);
                prop_assert!(message.contains(&tag_hex));
                prop_assert!(message.contains(&expected.to_string()));
                prop_assert_eq!(error.tag(), tag);
            }

            #[test]
            fn protocol_errors_name_stage_and_attempts(
                stage in "[a-z ]{1,20}",
                attempts in 1u32..100,
            ) {
                let error = StationError::protocol_exhausted(stage.clone(), attempts);
                let message = error.to_string();
                prop_assert!(message.contains(&stage));
                prop_assert!(message.contains(&attempts.to_string()));
                prop_assert!(error.is_retryable());
            }

            #[test]
            fn transport_source_chain_is_preserved(base_message in ".*") {
                let error = StationError::transport_with_source(
                    "read",
                    Box::new(std::io::Error::other(base_message.clone())),
                );
                let source = std::error::Error::source(&error);
                prop_assert!(source.is_some());
                prop_assert_eq!(source.map(|s| s.to_string()), Some(base_message));
            }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<StationError>();
        assert_send_sync_static::<DecodeError>();

        let error = StationError::transport("write");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn decode_errors_convert_and_are_not_retryable() {
        let error: StationError = DecodeError::UnknownTag(0x99).into();
        assert!(matches!(error, StationError::Decode(DecodeError::UnknownTag(0x99))));
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("0x99"));
    }

    #[test]
    fn recovery_suggestions_are_actionable() {
        let errors = [
            StationError::transport("read"),
            StationError::protocol_exhausted("handshake", 3),
            StationError::config("history_limit", "out of range"),
            StationError::unsupported_transport("USB HID", "hid"),
            StationError::Shutdown,
        ];

        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }

    #[test]
    fn yaml_errors_become_config_errors() {
        let err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let converted: StationError = err.into();
        assert!(matches!(converted, StationError::Config { .. }));
    }
}
