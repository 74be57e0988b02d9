//! HTTP handlers for the management API and the proxy surface.

pub mod keys;
pub mod oauth;
pub mod providers;
pub mod proxy;
pub mod usage;
