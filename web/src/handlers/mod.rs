//! HTTP request handlers.

pub mod health;
pub mod locations;
pub mod payments;
pub mod registrations;

pub use health::{health_check, readiness};
