// Error taxonomy for card submission and master-data resolution
// Every failure a caller can see is one of these named conditions.

use crate::entities::Dimension;

// ============================================================================
// FIELD-LEVEL VALIDATION ERROR
// ============================================================================

/// One failing field with a human-readable reason.
/// Validation always collects ALL of these before reporting, never just the first.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldError {}

// ============================================================================
// CARD ERROR
// ============================================================================

/// Top-level error type for everything between a submitted form and a
/// persisted card row.
#[derive(Debug)]
pub enum CardError {
    /// One or more required/format checks failed before any store call.
    ValidationFailed(Vec<FieldError>),

    /// The resolver could not read or write a master table for reasons
    /// other than the expected duplicate-key race.
    MasterDataUnavailable { dimension: Dimension, detail: String },

    /// The duplicate-key retry found nothing on the second lookup.
    /// Treated as a store-consistency anomaly, not a user mistake.
    MasterDataConflict { dimension: Dimension, label: String },

    /// Uploaded file fails the size or MIME allow-list checks.
    InvalidAttachment(String),

    /// Upload, delete, or signed-URL generation failed.
    StorageUnavailable(String),

    /// The composite card insert/update failed.
    WriteFailed(String),
}

impl CardError {
    /// Convenience constructor for a single-field validation failure.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        CardError::ValidationFailed(vec![FieldError::new(field, message)])
    }
}

impl std::fmt::Display for CardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardError::ValidationFailed(errors) => {
                write!(f, "validation failed: ")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
            CardError::MasterDataUnavailable { dimension, detail } => {
                write!(f, "master table '{}' unavailable: {}", dimension.table(), detail)
            }
            CardError::MasterDataConflict { dimension, label } => {
                write!(
                    f,
                    "master table '{}' inconsistent: '{}' raised a duplicate key but cannot be found",
                    dimension.table(),
                    label
                )
            }
            CardError::InvalidAttachment(msg) => write!(f, "invalid attachment: {}", msg),
            CardError::StorageUnavailable(msg) => write!(f, "image storage unavailable: {}", msg),
            CardError::WriteFailed(msg) => write!(f, "card write failed: {}", msg),
        }
    }
}

impl std::error::Error for CardError {}

// ============================================================================
// AUTH ERROR
// ============================================================================

/// Failures from the email/password auth flows.
#[derive(Debug)]
pub enum AuthError {
    /// Email or password rejected before any store call.
    InvalidInput(String),

    /// Sign-up with an email that already has an account.
    EmailTaken,

    /// Unknown email, wrong password, or expired/missing session.
    InvalidCredentials,

    /// The users/sessions tables could not be read or written.
    Unavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            AuthError::EmailTaken => write!(f, "an account with this email already exists"),
            AuthError::InvalidCredentials => write!(f, "invalid email or password"),
            AuthError::Unavailable(msg) => write!(f, "auth store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}
