//! Database repositories.

pub mod providers;
pub mod proxy_keys;
pub mod usage;

pub use providers::Providers;
pub use proxy_keys::ProxyKeys;
