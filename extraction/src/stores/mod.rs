//! Hybrid-store (C9) backends.
//!
//! [`crate::store::HybridStore`] is generic over a [`crate::store::VectorIndex`]
//! and a [`crate::store::DocumentStore`]; the in-process backend
//! ([`crate::store::InMemoryVectorIndex`]/[`crate::store::InMemoryDocumentStore`],
//! reachable via `HybridStore::in_memory()`) always ships. The backends here
//! are feature-gated, persistent alternatives implementing both traits on
//! one connection pool:
//! - `SqliteStore` - single-file storage (requires `sqlite` feature)
//! - `PostgresStore` - multi-process storage (requires `postgres` feature)

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
