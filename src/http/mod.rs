//! HTTP surface (health only)

pub mod routes;

pub use routes::build_router;
