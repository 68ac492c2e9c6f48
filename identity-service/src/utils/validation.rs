//! Shape checks for credentials. Pure functions; nothing here touches storage.

use thiserror::Error;

/// Named validation failures. The display text is what callers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("email is required")]
    EmailRequired,

    #[error("invalid email format")]
    InvalidEmail,

    #[error("invalid username")]
    InvalidUsername,

    #[error("invalid password")]
    InvalidPassword,

    #[error("password is required")]
    PasswordRequired,

    #[error("refresh token is required")]
    RefreshTokenRequired,

    #[error("invalid identity id")]
    InvalidIdentityId,
}

impl ValidationError {
    /// Name of the offending request field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmailRequired | ValidationError::InvalidEmail => "email",
            ValidationError::InvalidUsername => "username",
            ValidationError::InvalidPassword | ValidationError::PasswordRequired => "password",
            ValidationError::RefreshTokenRequired => "refresh_token",
            ValidationError::InvalidIdentityId => "identity_id",
        }
    }
}

const EMAIL_MIN_LEN: usize = 5;
const EMAIL_MAX_LEN: usize = 254;
const DOMAIN_MIN_LEN: usize = 2;
const DOMAIN_MAX_LEN: usize = 253;
const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 30;
const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 128;
const PASSWORD_MIN_CLASSES: usize = 3;

/// Validate an email address. An empty value is reported as
/// `EmailRequired` before any format check runs.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::EmailRequired);
    }

    let len = email.chars().count();
    if !(EMAIL_MIN_LEN..=EMAIL_MAX_LEN).contains(&len) {
        return Err(ValidationError::InvalidEmail);
    }

    if email.matches('@').count() != 1 {
        return Err(ValidationError::InvalidEmail);
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or(ValidationError::InvalidEmail)?;

    if local.is_empty() || domain.is_empty() {
        return Err(ValidationError::InvalidEmail);
    }

    let domain_len = domain.chars().count();
    if !(DOMAIN_MIN_LEN..=DOMAIN_MAX_LEN).contains(&domain_len) || !domain.contains('.') {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::InvalidUsername);
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    if !username.chars().all(allowed) {
        return Err(ValidationError::InvalidUsername);
    }

    let is_separator = |c: char| c == '_' || c == '-';
    if username.starts_with(is_separator) || username.ends_with(is_separator) {
        return Err(ValidationError::InvalidUsername);
    }

    if username.contains("__") || username.contains("--") {
        return Err(ValidationError::InvalidUsername);
    }

    Ok(())
}

/// Validate password strength: length bounds plus at least three of
/// uppercase, lowercase, digit, symbol.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(ValidationError::InvalidPassword);
    }

    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    let classes = [has_upper, has_lower, has_digit, has_symbol]
        .into_iter()
        .filter(|present| *present)
        .count();

    if classes < PASSWORD_MIN_CLASSES {
        return Err(ValidationError::InvalidPassword);
    }

    Ok(())
}

/// Registration order: email, username, password. First failure wins.
pub fn validate_registration(
    email: &str,
    username: &str,
    password: &str,
) -> Result<(), ValidationError> {
    validate_email(email)?;
    validate_username(username)?;
    validate_password(password)
}

/// Login only checks that the email is well formed and a password is present.
pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    Ok(())
}
