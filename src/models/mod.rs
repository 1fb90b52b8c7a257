//! Core data models for the object metadata service.
//!
//! Object rows map to database tables via `sqlx::FromRow`; keys are opaque
//! byte strings with their own ordering helpers.

pub mod key;
pub mod object;
