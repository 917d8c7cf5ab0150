//! hitstore: versioned document collection client for clustered search
//! engines.
//!
//! The application obtains a [`collection::Collection`] per document type
//! from the [`collection::registry::CollectionRegistry`]; every read, write,
//! search, and lifecycle operation on it funnels through the resilience
//! executor in [`executor`].

pub mod bulk;
pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod schema;
pub mod search;
pub mod transport;
pub mod update;

#[cfg(test)]
pub(crate) mod testutil;

pub use collection::registry::CollectionRegistry;
pub use collection::{Collection, GetRetry};
pub use config::EngineConfig;
pub use document::{Document, VersionToken};
pub use error::{Error, Result};
