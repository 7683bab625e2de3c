//! Password Service
//!
//! Argon2id hashing for the clinic's staff and admin credentials:
//! - Configurable cost parameters (OWASP defaults)
//! - Optional pepper appended before hashing
//! - Peppered input held in zeroizing buffers
//! - PHC string output, so verification reads parameters from the hash

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use zeroize::Zeroizing;

use crate::config::PasswordConfig;
use crate::error::{AuthError, AuthResult};

/// Password service for hashing and verification
#[derive(Clone)]
pub struct PasswordService {
    config: PasswordConfig,
}

impl PasswordService {
    /// Create a new password service
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    /// Hash a password using Argon2id
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        if password.is_empty() {
            return Err(AuthError::ValidationFailed("Password is required".to_string()));
        }
        if password.len() > self.config.max_password_length {
            return Err(AuthError::ValidationFailed(format!(
                "Password must be at most {} characters",
                self.config.max_password_length
            )));
        }

        let peppered = self.pepper(password);
        let salt = SaltString::generate(&mut OsRng);

        let hash = self.argon2()?.hash_password(peppered.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    /// Verify a password against a PHC hash
    ///
    /// Over-long input is rejected without hashing.
    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        if password.len() > self.config.max_password_length {
            return Ok(false);
        }

        let peppered = self.pepper(password);
        let parsed_hash = PasswordHash::new(hash)?;

        match Argon2::default().verify_password(peppered.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a stored hash was made with different cost parameters
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };
        let Ok(params) = Params::try_from(&parsed) else {
            return true;
        };

        parsed.algorithm != argon2::Algorithm::Argon2id.ident()
            || params.m_cost() != self.config.memory_cost
            || params.t_cost() != self.config.time_cost
            || params.p_cost() != self.config.parallelism
            || parsed.hash.map(|output| output.len()) != Some(self.config.hash_length as usize)
    }

    fn argon2(&self) -> AuthResult<Argon2<'static>> {
        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            Some(self.config.hash_length as usize),
        )
        .map_err(|e| AuthError::Config(format!("Invalid Argon2 params: {}", e)))?;

        Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
    }

    fn pepper(&self, password: &str) -> Zeroizing<String> {
        match self.config.pepper {
            Some(ref pepper) => Zeroizing::new(format!("{}{}", password, pepper)),
            None => Zeroizing::new(password.to_string()),
        }
    }
}
