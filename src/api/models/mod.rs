//! API request/response models (DTOs) for the management and proxy surfaces.

pub mod keys;
pub mod providers;
pub mod proxy;
pub mod usage;
