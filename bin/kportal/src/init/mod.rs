//! Initialisation logic for kportal processes.
mod actix;
mod backends;
mod generic;
mod server;
mod sync;

pub use self::generic::GenericInit;
pub use self::server::Server;
pub use self::sync::Sync;

/// ID of the kportal release in sentry recommended format.
const RELEASE_ID: &str = concat!(env!("CARGO_PKG_NAME"), "@", env!("CARGO_PKG_VERSION"));
