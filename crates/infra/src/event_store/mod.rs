//! Append-only event store boundary.
//!
//! Stores and loads per-aggregate event streams without making storage
//! assumptions. The in-memory store backs tests and dev runs; the Postgres
//! store backs persistent deployments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
