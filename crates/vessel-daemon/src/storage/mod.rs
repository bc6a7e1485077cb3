//! SQLite persistence for container records.

pub mod db;
pub mod models;
pub mod queries;
pub mod store;

pub use db::{Database, DatabaseError};
pub use models::{Container, ContainerStatus};
pub use queries::NewContainer;
pub use store::{ContainerStore, StoreError};
