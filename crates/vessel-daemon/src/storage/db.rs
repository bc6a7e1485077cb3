//! Database connection and initialization.

pub use vessel_core::db::DatabaseError;

vessel_core::define_database!(Database, "Database migrations complete");
