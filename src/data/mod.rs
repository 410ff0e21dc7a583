//! Database models and operations.

pub mod datasets;
pub mod kv;
pub mod live;
pub mod lock;
pub mod models;
pub mod staging;
pub mod swap;
pub mod translations;
