//! Error types returned by driver operations.

use std::{fmt, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

use crate::wire_version::WireVersion;

/// The result type used by all fallible driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error label attached to command errors that may be resolved by retrying
/// the whole transaction.
pub const TRANSIENT_TRANSACTION_ERROR: &str = "TransientTransactionError";

/// Error label attached to commit errors whose outcome is unknown.
pub const UNKNOWN_TRANSACTION_COMMIT_RESULT: &str = "UnknownTransactionCommitResult";

/// Server error codes that denote a transient condition. A command failure
/// carrying one of these codes is eligible for another attempt under the
/// operation's failover strategy.
const RETRYABLE_CODES: &[i32] = &[
    6,     // HostUnreachable
    7,     // HostNotFound
    89,    // NetworkTimeout
    91,    // ShutdownInProgress
    189,   // PrimarySteppedDown
    9001,  // SocketException
    10107, // NotWritablePrimary
    11600, // InterruptedAtShutdown
    11602, // InterruptedDueToReplStateChange
    13435, // NotPrimaryNoSecondaryOk
    13436, // NotPrimaryOrSecondary
    63,    // StaleShardVersion
    150,   // StaleEpoch
    202,   // NetworkInterfaceExceededTimeLimit
    13388, // StaleConfig
];

/// An error that can occur in the driver.
///
/// The inner [`ErrorKind`] is wrapped in an `Arc` so that errors can be
/// cloned cheaply, for instance when a single connection failure must be
/// fanned out to every waiter pending on that connection.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The category of error that occurred.
    pub kind: Arc<ErrorKind>,

    labels: Vec<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Arc::new(kind),
            labels: Vec::new(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        ErrorKind::InvalidResponse {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        ErrorKind::Network {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn session(message: impl Into<String>) -> Self {
        ErrorKind::Session {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn transaction(message: impl Into<String>) -> Self {
        ErrorKind::Transaction {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Whether this error contains the given label.
    pub fn contains_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
            || matches!(*self.kind, ErrorKind::Command(ref e) if e.labels.iter().any(|l| l == label))
    }

    /// The server error code, if this error is a command failure.
    pub fn code(&self) -> Option<i32> {
        match *self.kind {
            ErrorKind::Command(ref e) => Some(e.code),
            _ => None,
        }
    }

    /// Whether this error was caused by the transport rather than the server.
    pub fn is_network_error(&self) -> bool {
        matches!(
            *self.kind,
            ErrorKind::Io(_) | ErrorKind::Network { .. }
        )
    }

    /// Whether another attempt at the failed operation may succeed.
    ///
    /// Network failures and command failures whose code is in the server's
    /// published transient set are retryable; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        if self.is_network_error() {
            return true;
        }
        if self.contains_label(TRANSIENT_TRANSACTION_ERROR) {
            return true;
        }
        match self.code() {
            Some(code) => RETRYABLE_CODES.contains(&code),
            None => false,
        }
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self::new(err.into())
    }
}

/// The types of errors that can occur.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided to a database operation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// A description of the precondition that was violated.
        message: String,
    },

    /// The server rejected the connection handshake credentials.
    #[error("authentication failed: {message}")]
    Authentication {
        /// A description of the failure.
        message: String,
    },

    /// Wrapper around [`bson::de::Error`].
    #[error("{0}")]
    BsonDeserialization(#[from] bson::de::Error),

    /// Wrapper around [`bson::ser::Error`].
    #[error("{0}")]
    BsonSerialization(#[from] bson::ser::Error),

    /// The server returned an `{ok: 0}` reply to a command.
    #[error("command failed {0}")]
    Command(CommandError),

    /// Wrapper around [`std::io::Error`].
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The transport failed outside of an I/O call, e.g. the connection was
    /// torn down while a reply was pending.
    #[error("network failure: {message}")]
    Network {
        /// A description of the failure.
        message: String,
    },

    /// A violation of the wire protocol by the peer.
    #[error("{0}")]
    Protocol(ProtocolError),

    /// The server sent a reply the driver could not make sense of.
    #[error("invalid server response: {message}")]
    InvalidResponse {
        /// A description of what was malformed.
        message: String,
    },

    /// A deadline elapsed before the operation could complete.
    #[error("operation timed out: {message}")]
    Timeout {
        /// A description of the deadline that was exceeded.
        message: String,
    },

    /// The operation requires a wire version the connected server does not
    /// advertise.
    #[error("operation requires wire version {required:?} but the server supports {actual:?}")]
    UnsupportedOperation {
        /// The minimum wire version the operation needs.
        required: WireVersion,
        /// The wire version negotiated with the server.
        actual: WireVersion,
    },

    /// A session operation was invoked on a handle in the wrong state.
    #[error("session state error: {message}")]
    Session {
        /// A description of the invalid transition.
        message: String,
    },

    /// A transaction operation was invoked in the wrong state.
    #[error("transaction state error: {message}")]
    Transaction {
        /// A description of the invalid transition.
        message: String,
    },

    /// The caller cancelled the operation before it completed.
    #[error("operation cancelled: {message}")]
    Cancelled {
        /// A description of what was abandoned.
        message: String,
    },

    /// The driver itself failed an internal consistency check.
    #[error("internal error: {message}")]
    Internal {
        /// A description of the failure.
        message: String,
    },
}

/// A violation of the wire protocol by the peer. Connections that produce
/// one of these are discarded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame was shorter than its header claimed.
    #[error("truncated wire frame: {0}")]
    Frame(String),

    /// A frame carried an op code the driver does not recognize.
    #[error("unknown wire protocol op code: {0}")]
    UnknownOp(i32),

    /// A compressed frame could not be decoded.
    #[error("wire codec failure: {0}")]
    Codec(String),
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Self::new(ErrorKind::Protocol(err))
    }
}

/// An error that occurred due to a database command failing.
#[derive(Clone, Debug, Deserialize)]
pub struct CommandError {
    /// Identifies the type of failure.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the failure.
    #[serde(rename = "errmsg", default)]
    pub message: String,

    /// Labels categorizing the failure, e.g.
    /// [`TRANSIENT_TRANSACTION_ERROR`].
    #[serde(rename = "errorLabels", default)]
    pub labels: Vec<String>,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "({}): {}", self.code_name, self.message)
    }
}
