//! Authorization error taxonomy.
//!
//! Every failure that crosses a component boundary is an [`AuthError`]. The
//! `message` carried by a variant is for server-side logs only; callers get
//! the machine-readable code from [`AuthError::oauth_error_code`].

use std::fmt;

/// Errors produced by the authorization and token engine.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is malformed or missing a required parameter.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what is wrong with the request.
        message: String,
    },

    /// The client is unknown or presented bad credentials.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client was rejected.
        message: String,
    },

    /// The client is known but has been disabled.
    #[error("Client revoked: {client_id}")]
    ClientRevoked {
        /// The revoked client.
        client_id: String,
    },

    /// The authorization code or refresh token cannot be redeemed.
    ///
    /// Deliberately overloaded: expired, used, mismatched and unknown grants
    /// all surface as this one variant.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Internal cause, logged but never returned.
        message: String,
    },

    /// The requested scope is not allowed for the client or the grant.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of the rejected scope.
        message: String,
    },

    /// The identity has no effective permission for the client.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The presented session is unknown, expired, or of the wrong kind.
    #[error("Invalid session")]
    InvalidSession,

    /// A token failed signature, issuer, type, or format checks.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The token is past its expiry.
    #[error("Token expired")]
    TokenExpired,

    /// The grant type is not supported by this server.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The rejected grant type.
        grant_type: String,
    },

    /// The response type is not supported by this server.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The rejected response type.
        response_type: String,
    },

    /// A persistence call did not complete within its deadline.
    #[error("Temporarily unavailable: {operation} timed out")]
    TemporarilyUnavailable {
        /// The operation that timed out.
        operation: String,
    },

    /// A uniqueness constraint was violated.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting record.
        message: String,
    },

    /// The persistence layer failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// Signing or key handling failed.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },

    /// Unexpected internal fault.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the fault.
        message: String,
    },
}

impl AuthError {
    /// Creates an `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates an `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a `ClientRevoked` error.
    #[must_use]
    pub fn client_revoked(client_id: impl Into<String>) -> Self {
        Self::ClientRevoked {
            client_id: client_id.into(),
        }
    }

    /// Creates an `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates an `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates an `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates an `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates an `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates an `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a `TemporarilyUnavailable` error.
    #[must_use]
    pub fn temporarily_unavailable(operation: impl Into<String>) -> Self {
        Self::TemporarilyUnavailable {
            operation: operation.into(),
        }
    }

    /// Creates a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller is at fault (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::InvalidClient { .. }
                | Self::ClientRevoked { .. }
                | Self::InvalidGrant { .. }
                | Self::InvalidScope { .. }
                | Self::AccessDenied { .. }
                | Self::InvalidSession
                | Self::InvalidToken { .. }
                | Self::TokenExpired
                | Self::UnsupportedGrantType { .. }
                | Self::UnsupportedResponseType { .. }
                | Self::Conflict { .. }
        )
    }

    /// Returns `true` if the server is at fault (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns `true` if a blind retry by the caller is safe and may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TemporarilyUnavailable { .. })
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient { .. } | Self::ClientRevoked { .. } | Self::InvalidSession => {
                ErrorCategory::Authentication
            }
            Self::AccessDenied { .. } | Self::InvalidScope { .. } => ErrorCategory::Authorization,
            Self::InvalidGrant { .. } => ErrorCategory::Grant,
            Self::InvalidToken { .. } | Self::TokenExpired => ErrorCategory::Token,
            Self::InvalidRequest { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::UnsupportedResponseType { .. }
            | Self::Conflict { .. } => ErrorCategory::Request,
            Self::TemporarilyUnavailable { .. } => ErrorCategory::Availability,
            Self::Storage { .. } | Self::Signing { .. } | Self::Internal { .. } => {
                ErrorCategory::Infrastructure
            }
        }
    }

    /// Returns the machine-readable error code returned to callers.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::ClientRevoked { .. } => "client_revoked",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::AccessDenied { .. } => "access_denied",
            Self::InvalidSession => "access_denied",
            Self::InvalidToken { .. } | Self::TokenExpired => "invalid_token",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::TemporarilyUnavailable { .. } => "temporarily_unavailable",
            Self::Conflict { .. } => "invalid_request",
            Self::Storage { .. } | Self::Signing { .. } | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns a description safe to show to the caller.
    ///
    /// Only `InvalidRequest` passes its message through; those messages
    /// describe the caller's own parameters. Every other variant maps to
    /// fixed text so identities, client ids and storage causes stay in the
    /// logs.
    #[must_use]
    pub fn public_description(&self) -> String {
        let text = match self {
            Self::InvalidRequest { message } => return message.clone(),
            Self::InvalidClient { .. } => "Client authentication failed",
            Self::ClientRevoked { .. } => "The client has been disabled",
            Self::InvalidGrant { .. } => "The grant is invalid, expired, or has already been used",
            Self::InvalidScope { .. } => "The requested scope is not allowed",
            Self::AccessDenied { .. } => "Access to this application has not been granted",
            Self::InvalidSession => "Login required",
            Self::InvalidToken { .. } => "The token is invalid",
            Self::TokenExpired => "The token has expired",
            Self::UnsupportedGrantType { .. } => "The grant type is not supported",
            Self::UnsupportedResponseType { .. } => "The response type is not supported",
            Self::TemporarilyUnavailable { .. } => {
                "The server is temporarily unavailable, retry later"
            }
            Self::Conflict { .. } => "The record already exists",
            Self::Storage { .. } | Self::Signing { .. } | Self::Internal { .. } => {
                "Internal server error"
            }
        };
        text.to_string()
    }
}

/// Coarse grouping of [`AuthError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Client or session authentication failed.
    Authentication,
    /// The identity is not permitted to do this.
    Authorization,
    /// A code or refresh token could not be redeemed.
    Grant,
    /// Token verification failed.
    Token,
    /// The request itself is malformed.
    Request,
    /// A dependency timed out; safe to retry.
    Availability,
    /// Storage, signing, or internal fault.
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Grant => write!(f, "grant"),
            Self::Token => write!(f, "token"),
            Self::Request => write!(f, "request"),
            Self::Availability => write!(f, "availability"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}
