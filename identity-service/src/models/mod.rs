pub mod identity;
pub mod session;

pub use identity::{Email, Identity, IdentityRow, PasswordHash, Username};
pub use session::{Session, SessionRejection};
