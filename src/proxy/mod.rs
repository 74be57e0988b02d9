//! The proxy data path: model routing, payload translation, upstream
//! dispatch and usage capture.
//!
//! A chat request flows validate → select → (maybe refresh token) →
//! transform → dispatch → mirror → record; everything before dispatch is
//! pure and synchronous, everything after hangs off the response stream.

pub mod dispatch;
pub mod error;
pub mod router;
pub mod sse;
pub mod transform;

pub use error::ProxyError;
