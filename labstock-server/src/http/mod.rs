//! HTTP layer: error mapping, auth extractor, and route handlers.

pub mod error;
pub mod extractors;
pub mod routes;
