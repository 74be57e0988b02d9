use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

/// Fixed textual prefix for all proxy keys. Clients may present the raw key
/// or `Bearer <key>`; the prefix is how we tell a proxy key apart from other
/// bearer credentials.
pub const PROXY_KEY_PREFIX: &str = "sk-smoothllm-";

/// A freshly generated proxy key. The `full_key` leaves the process exactly
/// once, in the create response; only `hash` and `display_prefix` are stored.
pub struct GeneratedKey {
    pub full_key: String,
    pub hash: String,
    pub display_prefix: String,
}

/// Generates a proxy key with 256 bits of entropy.
///
/// The key is `sk-smoothllm-{64 hex chars}` where the hex encodes 32 bytes
/// from the OS CSPRNG. The prefix length is not security-sensitive; all the
/// entropy lives in the random part.
pub fn generate_proxy_key() -> GeneratedKey {
    let mut key_bytes = [0u8; 32];
    thread_rng().fill(&mut key_bytes);

    let random_part = hex::encode(key_bytes);
    let full_key = format!("{PROXY_KEY_PREFIX}{random_part}");

    GeneratedKey {
        hash: hash_key(&full_key),
        display_prefix: display_prefix(&random_part),
        full_key,
    }
}

/// SHA-256 of the full key, hex encoded. This is the only form a key is
/// persisted in; validation is a single lookup by this digest.
pub fn hash_key(full_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Truncated display form: `sk-smoothllm-abc123...f789`. Shows the first 6
/// and last 4 characters of the random part only.
fn display_prefix(random_part: &str) -> String {
    if random_part.len() > 10 {
        format!(
            "{PROXY_KEY_PREFIX}{}...{}",
            &random_part[..6],
            &random_part[random_part.len() - 4..]
        )
    } else {
        format!("{PROXY_KEY_PREFIX}{random_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_key_format() {
        let key = generate_proxy_key();

        assert!(key.full_key.starts_with(PROXY_KEY_PREFIX));
        // prefix + 64 hex chars
        assert_eq!(key.full_key.len(), PROXY_KEY_PREFIX.len() + 64);

        let random_part = &key.full_key[PROXY_KEY_PREFIX.len()..];
        assert!(random_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_key_uniqueness() {
        let mut keys = HashSet::new();
        for _ in 0..1000 {
            let key = generate_proxy_key();
            assert!(keys.insert(key.full_key), "generated duplicate proxy key");
        }
    }

    #[test]
    fn test_hash_is_stable_and_hex() {
        let h1 = hash_key("sk-smoothllm-test");
        let h2 = hash_key("sk-smoothllm-test");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_display_prefix_hides_key_material() {
        let key = generate_proxy_key();
        let random_part = &key.full_key[PROXY_KEY_PREFIX.len()..];

        assert!(key.display_prefix.starts_with(PROXY_KEY_PREFIX));
        assert!(key.display_prefix.contains("..."));

        // Only the first 6 and last 4 chars of the random part may appear.
        let shown = key.display_prefix.trim_start_matches(PROXY_KEY_PREFIX);
        let (head, tail) = shown.split_once("...").unwrap();
        assert_eq!(head, &random_part[..6]);
        assert_eq!(tail, &random_part[random_part.len() - 4..]);
        assert!(!key.display_prefix.contains(&random_part[6..random_part.len() - 4]));
    }

    #[test]
    fn test_hash_matches_presented_key() {
        let key = generate_proxy_key();
        assert_eq!(key.hash, hash_key(&key.full_key));
    }
}
