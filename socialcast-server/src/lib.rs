//! socialcast-server - HTTP front door for the social publishing gateway

pub mod routes;
pub mod session;

pub use routes::{build_router, AppState};
pub use session::SessionResolver;
