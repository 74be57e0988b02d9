//! Common ID type aliases.
//!
//! All entity IDs are UUIDs wrapped in type aliases for better type safety:
//!
//! - [`UserId`]: the tenant owning providers, keys and usage rows. The
//!   identity layer mints these; this crate only carries them.
//! - [`ProviderId`]: upstream provider configuration identifier
//! - [`KeyId`]: proxy key identifier
//! - [`UsageRecordId`]: one proxied request's receipt

use uuid::Uuid;

pub type UserId = Uuid;
pub type ProviderId = Uuid;
pub type KeyId = Uuid;
pub type UsageRecordId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviates_to_eight_chars() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }
}
