//! Versioned object metadata: version assignment for new objects and
//! cursor-paginated, directory-emulating object listings over SQL backends.

pub mod adapters;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;
