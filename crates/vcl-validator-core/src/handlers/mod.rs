//! Built-in request handlers

pub mod health;

pub use health::{Health, HealthStatus};
