//! SQLite-backed implementations of the core collaborator traits: the host
//! order gateway (orders plus their opaque metadata column) and the user
//! directory.

pub mod connection;
pub mod migrations;
pub mod orders;
pub mod users;

pub use connection::{connect, connect_single, DbPool};
pub use orders::SqlOrderGateway;
pub use users::SqlUserDirectory;
