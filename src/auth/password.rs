use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;
use tracing::error;

/// Argon2id cost parameters, fixed at build time so every stored hash is
/// produced with the same work factor: 19 MiB of memory, 2 passes, 1 lane.
const MEMORY_KIB: u32 = 19 * 1024;
const ITERATIONS: u32 = 2;
const PARALLELISM: u32 = 1;

/// Shown whenever a submitted password fails [`is_strong_password`].
pub const STRENGTH_REQUIREMENTS: &str = "Password must be 8 characters or more and include an uppercase letter, lowercase letter, number, and symbol.";

fn argon2() -> Argon2<'static> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, None)
        .expect("hard-coded argon2 params are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hash a plaintext password into a self-describing PHC string with a fresh
/// random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Check a plaintext password against a stored PHC string. A malformed
/// stored hash is a non-match, not an error.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!(error = %e, "stored password hash failed to parse");
            return false;
        }
    };
    argon2().verify_password(plain.as_bytes(), &parsed).is_ok()
}

/// Minimum strength rule: at least 8 characters with an uppercase letter, a
/// lowercase letter, a digit and a symbol.
pub fn is_strong_password(password: &str) -> bool {
    if password.chars().count() < 8 {
        return false;
    }
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric());
    has_upper && has_lower && has_digit && has_symbol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple").expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn verify_treats_malformed_hash_as_non_match() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn same_password_hashes_differently_each_time() {
        let first = hash_password("Secur3P@ssw0rd!").expect("hash");
        let second = hash_password("Secur3P@ssw0rd!").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn strength_rule_requires_all_character_classes() {
        assert!(is_strong_password("Abcdef1!"));
        assert!(is_strong_password("Tr0ub4dor&3"));

        assert!(!is_strong_password("Ab1!xyz")); // too short
        assert!(!is_strong_password("abcdef1!")); // no uppercase
        assert!(!is_strong_password("ABCDEF1!")); // no lowercase
        assert!(!is_strong_password("Abcdefg!")); // no digit
        assert!(!is_strong_password("Abcdefg1")); // no symbol
    }
}
