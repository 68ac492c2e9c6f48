//! Services layer for identity-service.
//!
//! Token makers, storage backends and the auth orchestrator.

pub mod auth;
pub mod context;
mod database;
pub mod error;
mod jwt;
pub mod memory;
mod sealed;
pub mod store;
pub mod sweeper;
pub mod token;

pub use auth::{AuthService, AuthSession, SessionSettings, TokenPair};
pub use context::{RequestContext, ServiceContext};
pub use database::{Database, PgStoreTx};
pub use error::AuthError;
pub use jwt::{JwtMaker, MIN_SECRET_KEY_LEN};
pub use memory::MemoryStore;
pub use sealed::{SealedMaker, SEALED_HEADER, SEALED_KEY_LEN};
pub use store::{IdentityStore, SessionStore, Store, StoreError, StoreTx};
pub use token::{MintedToken, TokenError, TokenMaker, TokenPayload, TokenScheme};
