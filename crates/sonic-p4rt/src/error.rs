//! Error types for P4RT session operations.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error types carrying operation and session context
//! - AU-3: Content of Audit Records - Errors include sufficient detail for audit

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::device_config::ConfigBuildError;

/// Result type alias for P4RT session operations.
pub type P4rtResult<T> = Result<T, P4rtError>;

/// Errors that can occur while driving a P4Runtime session.
///
/// Transport failures are never reinterpreted: the original [`tonic::Status`]
/// is kept as the error source so callers can inspect the gRPC code.
#[derive(Debug, Error)]
pub enum P4rtError {
    /// The device address could not be turned into a gRPC endpoint.
    #[error("Invalid device address '{address}': {message}")]
    InvalidAddress {
        /// The address as configured.
        address: String,
        /// Why the endpoint was rejected.
        message: String,
    },

    /// A unary call or stream setup failed at the gRPC layer.
    /// NIST: SC-8 (Transmission Confidentiality) - Device communication errors
    #[error("{operation} failed on session '{session}': {source}")]
    Transport {
        /// The protocol operation (e.g., "Write").
        operation: &'static str,
        /// The session name.
        session: String,
        /// The gRPC status returned by the transport.
        #[source]
        source: tonic::Status,
    },

    /// The control stream closed or failed before yielding a mastership reply.
    /// NIST: AC-3 (Access Enforcement) - Session is not master
    #[error("Mastership arbitration failed on session '{session}': {reason}")]
    ArbitrationFailure {
        /// The session name.
        session: String,
        /// Description of what went wrong.
        reason: String,
        /// The stream status, if the stream ended with an error.
        #[source]
        source: Option<tonic::Status>,
    },

    /// The device-family config builder failed; nothing was sent.
    #[error("Device config build failed: {0}")]
    ConfigBuild(#[from] ConfigBuildError),

    /// A streaming read ended abnormally.
    #[error("{operation} stream terminated on session '{session}': {source}")]
    StreamTerminated {
        /// The protocol operation.
        operation: &'static str,
        /// The session name.
        session: String,
        /// The terminal gRPC status.
        #[source]
        source: tonic::Status,
    },

    /// The session has been shut down.
    #[error("Session '{0}' is shut down")]
    SessionClosed(String),

    /// The outbound request queue no longer accepts messages.
    #[error("Outbound request queue is closed")]
    QueueClosed,

    /// The caller's cancellation token fired, or the session shut down mid-call.
    #[error("{operation} cancelled on session '{session}'")]
    Cancelled {
        /// The protocol operation.
        operation: &'static str,
        /// The session name.
        session: String,
    },

    /// The caller-supplied deadline expired.
    #[error("{operation} exceeded deadline of {timeout:?} on session '{session}'")]
    DeadlineExceeded {
        /// The protocol operation.
        operation: &'static str,
        /// The session name.
        session: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Invalid session configuration.
    /// NIST: CM-6 (Configuration Settings) - Configuration validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (request log file).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl P4rtError {
    /// Creates a transport error for an operation on a session.
    pub fn transport(operation: &'static str, session: impl Into<String>, source: tonic::Status) -> Self {
        Self::Transport {
            operation,
            session: session.into(),
            source,
        }
    }

    /// Creates an arbitration failure.
    pub fn arbitration(
        session: impl Into<String>,
        reason: impl Into<String>,
        source: Option<tonic::Status>,
    ) -> Self {
        Self::ArbitrationFailure {
            session: session.into(),
            reason: reason.into(),
            source,
        }
    }

    /// Creates a stream termination error.
    pub fn stream_terminated(
        operation: &'static str,
        session: impl Into<String>,
        source: tonic::Status,
    ) -> Self {
        Self::StreamTerminated {
            operation,
            session: session.into(),
            source,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(operation: &'static str, session: impl Into<String>) -> Self {
        Self::Cancelled {
            operation,
            session: session.into(),
        }
    }

    /// Returns true for connection-level failures surfaced by the transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            P4rtError::InvalidAddress { .. }
                | P4rtError::Transport { .. }
                | P4rtError::StreamTerminated { .. }
        )
    }

    /// Returns the underlying gRPC status, if this error carries one.
    pub fn status(&self) -> Option<&tonic::Status> {
        match self {
            P4rtError::Transport { source, .. } | P4rtError::StreamTerminated { source, .. } => {
                Some(source)
            }
            P4rtError::ArbitrationFailure { source, .. } => source.as_ref(),
            _ => None,
        }
    }
}
