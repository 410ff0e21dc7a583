//! Web API module: read projections, admin operations, and status.

pub mod admin;
pub mod decks;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod status;

pub use routes::*;
