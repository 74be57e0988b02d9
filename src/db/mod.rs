//! Database layer: repositories over a shared PostgreSQL pool.
//!
//! Each entity has a repository in [`handlers`] holding a `&mut PgConnection`
//! (a pool connection or a transaction), and request/response structs in
//! [`models`]. Multi-row invariants (key creation with its allow-list,
//! OAuth-bootstrapping provider creation) run inside transactions owned by
//! the API layer; single-row updates go straight to a pool connection.

pub mod errors;
pub mod handlers;
pub mod models;

/// Get the database migrator for the bundled migrations.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
