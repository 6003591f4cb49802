//! Recoverable account-workflow failures.
//!
//! These are returned inside `anyhow::Error` and can be recovered with
//! `downcast_ref::<AuthError>()` when a caller needs to branch on the kind.

/// A failed account operation, carrying the message shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    Pending,
    Rejected,
    InvalidCurrentPassword,
    NotAuthenticated,
    Forbidden,
    UnknownUser(String),
    AlreadyDecided { id: String, status: String },
    DuplicateEmail(String),
    Validation { field: String, message: String },
}

impl AuthError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "Invalid email or password"),
            Self::Pending => write!(f, "Your account is waiting for admin approval."),
            Self::Rejected => write!(
                f,
                "Your registration has been rejected. Please contact support."
            ),
            Self::InvalidCurrentPassword => write!(f, "Invalid current password"),
            Self::NotAuthenticated => write!(f, "Not logged in"),
            Self::Forbidden => write!(f, "Admin access required"),
            Self::UnknownUser(id) => write!(f, "No registration with id {}", id),
            Self::AlreadyDecided { id, status } => {
                write!(f, "Registration {} has already been {}", id, status)
            }
            Self::DuplicateEmail(email) => write!(f, "User already exists: {}", email),
            Self::Validation { field, message } => write!(f, "[{}]: {}", field, message),
        }
    }
}

impl std::error::Error for AuthError {}
