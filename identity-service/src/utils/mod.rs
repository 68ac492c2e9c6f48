pub mod json;
pub mod password;
pub mod validation;

pub use json::JsonBody;
pub use password::{Argon2Hasher, CredentialHasher, HashCost, Password};
pub use validation::{
    validate_email, validate_login, validate_password, validate_registration, validate_username,
    ValidationError,
};
