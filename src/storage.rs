//! Web storage for browsing contexts.
//!
//! Token Store and Bridge Client persist through the DOM `localStorage` API, modeled here as
//! the object-safe [`StorageArea`] trait. A [`LocalStore`] hands out one shared area per
//! `(partition, origin)` pair, so two documents of the same origin under the same partition
//! observe each other's writes while other origins stay isolated.
//!
//! # Available types
//!
//! - [`StorageArea`]: key/value area (`getItem`, `setItem`, `removeItem`, `clear`).
//! - [`LocalStore`]: provisioner of areas.
//! - [`InMemoryLocalStore`]: default in-memory provisioner.
//! - [`DisabledStorageArea`]: area of a user agent with storage blocked; every call fails.
//! - [`PartitionKey`] / [`PartitionPolicy`]: third-party storage partitioning.
//!
//! # Partitioning
//!
//! With [`PartitionPolicy::TopLevelOrigin`] an embedded document's storage is keyed by the
//! top-level page as well, the way browsers partition third-party iframes. The token then
//! survives per embedding site instead of globally.

/// Storage area module, defining the key/value storage interface.
pub mod area;
/// Storage partitioning types
pub mod types;

/// Local storage module, providing storage areas.
pub mod local {
    /// In-memory local storage implementation.
    pub mod in_memory;
}

pub use area::{DisabledStorageArea, LocalStore, StorageArea};
pub use local::in_memory::InMemoryLocalStore;
pub use types::{compute_partition_key, PartitionKey, PartitionPolicy};
