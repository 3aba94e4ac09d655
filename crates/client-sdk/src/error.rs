use thiserror::Error;

/// Failures reported by the identity, document or object-storage collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Remote server returned {status}: {message}")]
    Server { status: u16, message: String },
}

impl RemoteError {
    /// Maps a gateway status code and error body onto the taxonomy above.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 413 | 422 => RemoteError::BadRequest(message),
            401 if message == "Invalid credentials" => RemoteError::InvalidCredentials,
            401 => RemoteError::Unauthenticated(message),
            403 => RemoteError::PermissionDenied(message),
            404 => RemoteError::NotFound(message),
            409 => RemoteError::Conflict(message),
            _ => RemoteError::Server { status, message },
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Malformed(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// Errors surfaced by dashboard controllers. None of them are fatal; each stays
/// local to the screen that produced it.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    NotFound(String),

    #[error("You don't have permission to perform this action.")]
    Forbidden,

    #[error("Failed to decode record: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DashboardError {
    pub fn validation(message: impl Into<String>) -> Self {
        DashboardError::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DashboardError::Validation(_))
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert_eq!(
            RemoteError::from_status(401, "Invalid credentials".into()),
            RemoteError::InvalidCredentials
        );
        assert!(matches!(
            RemoteError::from_status(401, "Invalid token".into()),
            RemoteError::Unauthenticated(_)
        ));
        assert!(matches!(
            RemoteError::from_status(404, "missing".into()),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            RemoteError::from_status(503, "down".into()),
            RemoteError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn remote_errors_display_through_dashboard_error() {
        let err = DashboardError::from(RemoteError::PermissionDenied("users".into()));
        assert_eq!(err.to_string(), "Permission denied: users");
        assert!(!err.is_validation());
        assert!(DashboardError::validation("Please fill in all fields.").is_validation());
    }
}
