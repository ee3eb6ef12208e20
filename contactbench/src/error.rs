//! Errors produced by individual benchmark requests.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// A failure of a single request against the contacts service.
///
/// These never abort a phase. The worker that observed the error logs it, counts it under its
/// [`FailureKind`] and moves on to the next job.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Connection, timeout or body streaming failure from the underlying [`reqwest`] client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("unexpected status: {0}")]
    Status(StatusCode),

    /// The response body of a create request could not be decoded into a contact.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The created contact was returned without an identifier.
    #[error("created contact has no id")]
    MissingId,

    /// A read job ran without any created contact to look up.
    #[error("no contacts to query")]
    NoContacts,
}

impl RequestError {
    /// Returns the category this error is accounted under.
    pub fn kind(&self) -> FailureKind {
        match self {
            RequestError::Transport(_) => FailureKind::Transport,
            RequestError::Status(_) => FailureKind::Status,
            RequestError::Decode(_) | RequestError::MissingId => FailureKind::Decode,
            RequestError::NoContacts => FailureKind::Precondition,
        }
    }
}

/// Category of a failed request, used for reporting.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FailureKind {
    /// The request did not complete at the transport level.
    Transport,
    /// The request completed with a non-2xx status.
    Status,
    /// The request completed but its response was unusable.
    Decode,
    /// The request was never sent because its input was missing.
    Precondition,
}

impl FailureKind {
    /// All failure kinds, in reporting order.
    pub const ALL: [FailureKind; 4] = [
        FailureKind::Transport,
        FailureKind::Status,
        FailureKind::Decode,
        FailureKind::Precondition,
    ];

    /// Short lowercase name, used in logs and the console report.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Status => "status",
            FailureKind::Decode => "decode",
            FailureKind::Precondition => "precondition",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
