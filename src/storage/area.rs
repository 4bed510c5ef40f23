use super::types::PartitionKey;
use anyhow::{anyhow, Result};
use std::sync::Arc;

/// Object-safe key/value storage area (DOM's Storage).
///
/// Every call may fail the way `localStorage` does in a browser (quota exceeded, storage
/// disabled, private mode). Callers decide how to degrade.
pub trait StorageArea: Send + Sync {
    /// Retrieves the value associated with the given key, or `None` if not found.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Sets the value for the given key, overwriting any existing value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes the item with the given key.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Clears all items in the storage area.
    fn clear(&self) -> Result<()>;
}

/// Store for localStorage-like areas (shared per (partition, origin)).
pub trait LocalStore: Send + Sync {
    /// Retrieves the storage area for the given partition and origin.
    fn area(&self, part: &PartitionKey, origin: &url::Origin) -> Result<Arc<dyn StorageArea>>;
}

/// Storage of a user agent that blocks script storage entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStorageArea;

impl StorageArea for DisabledStorageArea {
    fn get_item(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("localStorage is disabled"))
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("localStorage is disabled"))
    }

    fn remove_item(&self, _key: &str) -> Result<()> {
        Err(anyhow!("localStorage is disabled"))
    }

    fn clear(&self) -> Result<()> {
        Err(anyhow!("localStorage is disabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryLocalStore;

    fn set(area: &Arc<dyn StorageArea>, k: &str, v: &str) {
        area.set_item(k, v).unwrap();
    }

    fn o(s: &str) -> url::Origin {
        let url = url::Url::parse(s).expect("valid URL");
        url.origin()
    }

    #[test]
    fn storagearea_basic_contract() {
        let store = InMemoryLocalStore::new();
        let area = store.area(&PartitionKey::None, &o("https://example.com")).unwrap();

        // starts empty
        assert!(area.get_item("missing").unwrap().is_none());

        // set + get
        set(&area, "a", "1");
        set(&area, "b", "2");
        assert_eq!(area.get_item("a").unwrap().as_deref(), Some("1"));
        assert_eq!(area.get_item("b").unwrap().as_deref(), Some("2"));

        // overwrite
        set(&area, "a", "ONE");
        assert_eq!(area.get_item("a").unwrap().as_deref(), Some("ONE"));

        // remove
        area.remove_item("b").unwrap();
        assert!(area.get_item("b").unwrap().is_none());

        // clear
        area.clear().unwrap();
        assert!(area.get_item("a").unwrap().is_none());
    }

    #[test]
    fn disabled_area_fails_every_operation() {
        let area = DisabledStorageArea;
        assert!(area.get_item("k").is_err());
        assert!(area.set_item("k", "v").is_err());
        assert!(area.remove_item("k").is_err());
        assert!(area.clear().is_err());
    }
}
