//! Form and upload validation used by the UI layer.
//!
//! These checks sit outside the store contract: they return a result the UI
//! renders next to the offending field.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum username length, in characters
pub const MIN_USERNAME_LEN: usize = 3;

/// Minimum password length, in characters
pub const MIN_PASSWORD_LEN: usize = 6;

/// Largest accepted upload, in bytes (2 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024;

/// Signup form input
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupForm {
    /// Username
    pub username: String,
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
}

/// One invalid signup field
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum FieldError {
    /// Username is empty
    #[error("username is required")]
    UsernameRequired,

    /// Username is too short
    #[error("username must be at least {min} characters")]
    UsernameTooShort {
        /// Minimum length
        min: usize,
    },

    /// Email is empty
    #[error("email is required")]
    EmailRequired,

    /// Email does not look like an address
    #[error("email address is not valid")]
    EmailInvalid,

    /// Password is empty
    #[error("password is required")]
    PasswordRequired,

    /// Password is too short
    #[error("password must be at least {min} characters")]
    PasswordTooShort {
        /// Minimum length
        min: usize,
    },
}

impl FieldError {
    /// Name of the form field this error belongs to
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::UsernameRequired | Self::UsernameTooShort { .. } => "username",
            Self::EmailRequired | Self::EmailInvalid => "email",
            Self::PasswordRequired | Self::PasswordTooShort { .. } => "password",
        }
    }
}

/// All invalid fields of a signup form, at most one per field
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("signup form has {} invalid field(s)", .0.len())]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    /// The error for `field`, if any
    #[must_use]
    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.0.iter().find(|error| error.field() == field)
    }
}

/// Validates a signup form
///
/// # Errors
///
/// Returns [`FieldErrors`] listing every invalid field.
pub fn validate_signup(form: &SignupForm) -> Result<(), FieldErrors> {
    let mut errors = Vec::new();

    if form.username.is_empty() {
        errors.push(FieldError::UsernameRequired);
    } else if form.username.chars().count() < MIN_USERNAME_LEN {
        errors.push(FieldError::UsernameTooShort {
            min: MIN_USERNAME_LEN,
        });
    }

    if form.email.is_empty() {
        errors.push(FieldError::EmailRequired);
    } else if !looks_like_email(&form.email) {
        errors.push(FieldError::EmailInvalid);
    }

    if form.password.is_empty() {
        errors.push(FieldError::PasswordRequired);
    } else if form.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(FieldErrors(errors))
    }
}

/// Some whitespace-free run of the input has the shape `x@y.z`.
fn looks_like_email(input: &str) -> bool {
    input.split_whitespace().any(|token| {
        let Some(at) = token.char_indices().skip(1).find(|&(_, c)| c == '@').map(|(i, _)| i) else {
            return false;
        };
        let domain: Vec<char> = token[at + 1..].chars().collect();
        domain
            .iter()
            .enumerate()
            .any(|(i, &c)| c == '.' && i >= 1 && i + 1 < domain.len())
    })
}

/// Metadata of a file selected for upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMeta {
    /// File name as selected
    pub file_name: String,
    /// Declared MIME type
    pub mime_type: String,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Rejected upload
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum UploadError {
    /// The file is not an image
    #[error("'{file_name}' is not an image ({mime_type})")]
    NotAnImage {
        /// File name
        file_name: String,
        /// Declared MIME type
        mime_type: String,
    },

    /// The file is too large
    #[error("file is {size} bytes, the limit is {max} bytes")]
    TooLarge {
        /// Actual size
        size: u64,
        /// Limit
        max: u64,
    },
}

/// Validates an image upload: `image/*` and at most 2 MiB
///
/// # Errors
///
/// Returns [`UploadError`] for non-image types or oversized files.
pub fn validate_upload(meta: &UploadMeta) -> Result<(), UploadError> {
    let is_image = meta
        .mime_type
        .split_once('/')
        .is_some_and(|(kind, subtype)| kind.eq_ignore_ascii_case("image") && !subtype.is_empty());

    if !is_image {
        return Err(UploadError::NotAnImage {
            file_name: meta.file_name.clone(),
            mime_type: meta.mime_type.clone(),
        });
    }

    if meta.size_bytes > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge {
            size: meta.size_bytes,
            max: MAX_UPLOAD_BYTES,
        });
    }

    Ok(())
}
