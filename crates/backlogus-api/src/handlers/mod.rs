//! HTTP request handlers.

pub mod backup;
