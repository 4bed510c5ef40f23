use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use anyhow::{anyhow, Result};
use crate::storage::area::{LocalStore, StorageArea};
use crate::storage::types::PartitionKey;

/// In‑memory local storage (no persistence). Used as a default when no storage is defined by the UA.
#[derive(Default)]
pub struct InMemoryLocalStore {
    areas: Mutex<HashMap<(PartitionKey, url::Origin), Arc<dyn StorageArea>>>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for InMemoryLocalStore {
    fn area(&self, part: &PartitionKey, origin: &url::Origin) -> Result<Arc<dyn StorageArea>> {
        let key = (part.clone(), origin.clone());
        let mut guard = self.areas.lock().map_err(|_| anyhow!("local store lock poisoned"))?;
        Ok(guard
            .entry(key)
            .or_insert_with(|| Arc::new(InMemoryLocalArea::default()) as Arc<dyn StorageArea>)
            .clone())
    }
}

#[derive(Default)]
struct InMemoryLocalArea {
    map: Mutex<HashMap<String, String>>,
}

impl InMemoryLocalArea {
    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut guard = self.map.lock().map_err(|_| anyhow!("storage area lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl StorageArea for InMemoryLocalArea {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.with_map(|m| m.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.with_map(|m| {
            m.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.with_map(|m| {
            m.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.with_map(HashMap::clear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn o(s: &str) -> url::Origin {
        let url = url::Url::parse(s).expect("valid URL");
        url.origin()
    }

    #[test]
    fn same_pair_shares_area_different_pairs_isolate() {
        let store = InMemoryLocalStore::new();
        let part_a = PartitionKey::TopLevel(o("https://a.test"));
        let part_b = PartitionKey::TopLevel(o("https://b.test"));
        let orig_a = o("https://a.test");
        let orig_b = o("https://b.test");

        let a1 = store.area(&part_a, &orig_a).unwrap();
        let a2 = store.area(&part_a, &orig_a).unwrap();
        a1.set_item("k", "v").unwrap();
        assert_eq!(a2.get_item("k").unwrap().as_deref(), Some("v")); // shared

        // different origin
        let other_origin = store.area(&part_a, &orig_b).unwrap();
        assert!(other_origin.get_item("k").unwrap().is_none());

        // different partition
        let other_part = store.area(&part_b, &orig_a).unwrap();
        assert!(other_part.get_item("k").unwrap().is_none());
    }

    #[test]
    fn clear_empties_only_that_area() {
        let store = InMemoryLocalStore::new();
        let a = store.area(&PartitionKey::None, &o("https://a.test")).unwrap();
        let b = store.area(&PartitionKey::None, &o("https://b.test")).unwrap();
        a.set_item("k", "1").unwrap();
        b.set_item("k", "2").unwrap();

        a.clear().unwrap();
        assert!(a.get_item("k").unwrap().is_none());
        assert_eq!(b.get_item("k").unwrap().as_deref(), Some("2"));
    }
}
