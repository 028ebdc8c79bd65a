//! Bencao storage layer
//!
//! The importer talks to its backend only through the [`Store`] trait:
//! upsert, select, insert, update, delete and count on named tables of flat JSON
//! rows. Two implementations ship with the crate:
//!
//! - [`RestStore`] speaks PostgREST, the data API behind Supabase.
//! - [`MemoryStore`] keeps everything in process, for tests and dry runs.
//!
//! # Example
//!
//! ```rust,no_run
//! use bencao_db::{Filter, RestConfig, RestStore, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RestConfig::new(
//!         "https://example.supabase.co".parse()?,
//!         std::env::var("SUPABASE_SERVICE_ROLE_KEY")?.into(),
//!     );
//!     let store = RestStore::new(config)?;
//!     let rows = store.select("meridians", &[Filter::eq("name", "手太阴肺经")], Some(1)).await?;
//!     println!("{rows:?}");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod rest;
pub mod store;

pub use bencao_common::Row;
pub use error::{DbError, Result};
pub use memory::MemoryStore;
pub use rest::{RestConfig, RestStore};
pub use store::{Filter, Store};
