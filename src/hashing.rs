use rand::Rng;
use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

/// Hash a deletion password with a fresh random salt.
///
/// The stored form is `sha256$<salt hex>$<digest hex>`.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::thread_rng().gen();
    let digest = salted_digest(&salt, password);
    format!("{SCHEME}${}${}", hex::encode(salt), hex::encode(digest))
}

/// Check a plaintext password against a stored hash. Malformed hashes never
/// verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(SCHEME), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
        return false;
    };
    let actual = salted_digest(&salt, password);
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Pseudonymous submitter fingerprint for "my pastes" filtering.
pub fn user_fingerprint(secret: &str, client: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b"\0");
    hasher.update(client.as_bytes());
    hex::encode(hasher.finalize())
}

fn salted_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}
