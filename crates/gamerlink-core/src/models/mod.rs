//! Data models for backend-computed collections.
//!
//! - `Collection`: which server-cached collection a call targets
//! - `CollectionSnapshot`: normalized response for any collection
//! - `Friend`, `Game`: typed pass-through records

pub mod collection;
pub mod friend;

pub use collection::{Collection, CollectionSnapshot};
pub use friend::{Friend, Game};
