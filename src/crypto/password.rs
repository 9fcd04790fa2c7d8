use crate::error::{AppError, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;
/// The salt length in bytes.
const SALT_LEN: usize = 16;

fn argon2() -> Result<Argon2<'static>> {
    let params = ParamsBuilder::new()
        .m_cost(ARGON2_MEMORY_MB * 1024)
        .t_cost(ARGON2_ITERATIONS)
        .p_cost(ARGON2_PARALLELISM)
        .build()
        .map_err(|e| AppError::Hashing(format!("Argon2 params: {}", e)))?;

    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Hashes a password using Argon2id with a fresh random salt.
///
/// # Arguments
///
/// * `password` - The plaintext password.
///
/// # Returns
///
/// The PHC string (`$argon2id$v=19$m=...`), which embeds the salt and
/// parameters needed for verification.
pub fn hash_password(password: &str) -> Result<String> {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());

    let mut salt_bytes = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| AppError::Internal(format!("Failed to generate salt: {}", e)))?;

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Hashing(format!("Salt encoding error: {}", e)))?;

    let password_hash = argon2()?
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Hashing(format!("Argon2 hash error: {}", e)))?
        .to_string();

    tracing::debug!("Password hashed with Argon2id");
    Ok(password_hash)
}

/// Verifies a password against a PHC hash.
///
/// The comparison inside argon2 is constant-time. A hash that cannot be
/// parsed, or any other failure while hashing the candidate, counts as a
/// mismatch and is logged.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            return false;
        }
    };

    match Argon2::default().verify_password(&password_bytes, &parsed_hash) {
        Ok(()) => true,
        Err(argon2::password_hash::Error::Password) => false,
        Err(e) => {
            tracing::warn!("Password verification failed while hashing: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Correct-Horse-42").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("Correct-Horse-42"));
        assert!(verify_password("Correct-Horse-42", &hash));
    }

    #[test]
    fn other_passwords_do_not_verify() {
        let hash = hash_password("Correct-Horse-42").unwrap();
        assert!(!verify_password("Correct-Horse-43", &hash));
        assert!(!verify_password("Correct-Horse-4", &hash));
        assert!(!verify_password("", &hash));
    }

    #[test]
    fn salts_are_unique() {
        let a = hash_password("Correct-Horse-42").unwrap();
        let b = hash_password("Correct-Horse-42").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }
}
