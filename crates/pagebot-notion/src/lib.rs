//! Document-store layer: the narrow collaborator interface the pipeline
//! depends on, a Notion REST implementation, and the page status machine.

pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod page;
pub mod status;
mod store;

pub use http::NotionClient;
#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryStore, StoreCall};
pub use status::{Claim, StatusMachine};
pub use store::{DocumentStore, NotionError};
