// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

/// `CalDAV` synchronization errors.
///
/// The first group mirrors what a dispatcher must react to (prompt for credentials,
/// re-refresh before retrying a write, give up). The wire kinds below it describe
/// malformed exchanges and are mostly converted before they reach the caller.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CalDavError {
    /// The server requires credentials and none were configured.
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    /// The configured credentials were rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server reported a missing privilege for this operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The server returned an object or response that lacks required parts.
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// A write precondition failed and the conflict policy did not absorb it.
    #[error("Out of sync with the server: {0}")]
    OutOfSync(String),

    /// The operation was cancelled by the caller.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Network or transport failure, safe to retry.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The server misbehaved in a way that selects a fallback path.
    #[error("Server doesn't conform: {0}")]
    ServerNonConformant(String),

    /// Capability discovery succeeded but the URL is not a calendar collection.
    #[error("Given URL \u{201c}{0}\u{201d} doesn't reference a CalDAV calendar")]
    NotACalendar(String),

    /// Precondition failed (`ETag` mismatch).
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Any other unsuccessful HTTP status.
    #[error("HTTP error {status}: {message}")]
    Http {
        /// Status code returned by the server.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// XML parsing/writing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CalDavError {
    /// Returns true for errors that should make the caller ask for credentials.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired(_) | Self::AuthenticationFailed(_)
        )
    }

    /// Returns true for errors that also invalidate trust in the previous probe.
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired(_)
                | Self::AuthenticationFailed(_)
                | Self::PermissionDenied(_)
                | Self::Http { status: 403, .. }
        )
    }

    /// Returns true if the resource was not found.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for CalDavError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<quick_xml::Error> for CalDavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::io::Error> for CalDavError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(format!("IO error: {e}"))
    }
}
