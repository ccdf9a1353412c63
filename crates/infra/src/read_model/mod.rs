//! Disposable read model storage.

pub mod page;
pub mod store;

pub use page::{Page, PageRequest, paginate};
pub use store::{InMemoryReadStore, ReadStore};
