use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;

/// Newtype for a plaintext password to prevent accidental logging.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// One-way password hashing collaborator.
///
/// Both operations are CPU-bound; implementations must not block the async
/// executor.
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash(&self, password: &Password) -> Result<String, anyhow::Error>;

    /// `Ok(false)` on mismatch. `Err` only when the stored digest is unusable.
    async fn verify(&self, password: &Password, digest: &str) -> Result<bool, anyhow::Error>;
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Argon2id hasher running on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(cost: HashCost) -> Result<Self, anyhow::Error> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {}", e))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

/// Hash a password using Argon2id. The salt is generated here and embedded
/// in the PHC string.
fn hash_blocking(argon2: &Argon2<'_>, password: &str) -> Result<String, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(password_hash)
}

fn verify_blocking(argon2: &Argon2<'_>, password: &str, digest: &str) -> Result<bool, anyhow::Error> {
    let parsed_hash = PasswordHash::new(digest)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

#[async_trait]
impl CredentialHasher for Argon2Hasher {
    async fn hash(&self, password: &Password) -> Result<String, anyhow::Error> {
        let argon2 = self.argon2();
        let password = password.clone();
        tokio::task::spawn_blocking(move || hash_blocking(&argon2, password.as_str()))
            .await
            .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))?
    }

    async fn verify(&self, password: &Password, digest: &str) -> Result<bool, anyhow::Error> {
        let argon2 = self.argon2();
        let password = password.clone();
        let digest = digest.to_string();
        tokio::task::spawn_blocking(move || verify_blocking(&argon2, password.as_str(), &digest))
            .await
            .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?
    }
}
