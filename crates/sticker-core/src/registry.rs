use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::model::StickerPack;
use crate::store::PackStore;

/// In-memory index of committed packs, in insertion order.
///
/// Inserts never replace an existing identifier. Locks are held only for the map
/// operation itself.
#[derive(Default)]
pub struct PackRegistry {
    packs: RwLock<IndexMap<String, Arc<StickerPack>>>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated from every intact pack in `store`.
    pub fn load(store: &PackStore) -> Result<Self, StorageError> {
        let registry = Self::new();
        for pack in store.load_all()? {
            registry.insert(pack);
        }
        tracing::info!(packs = registry.len(), root = %store.root().display(), "pack registry loaded");
        Ok(registry)
    }

    /// Returns the registered pack for the identifier, inserting `pack` only if absent.
    pub fn insert(&self, pack: StickerPack) -> Arc<StickerPack> {
        let mut packs = self.packs.write();
        if let Some(existing) = packs.get(&pack.identifier) {
            return Arc::clone(existing);
        }
        let pack = Arc::new(pack);
        packs.insert(pack.identifier.clone(), Arc::clone(&pack));
        pack
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<StickerPack>> {
        self.packs.read().get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.packs.read().contains_key(identifier)
    }

    pub fn snapshot(&self) -> Vec<Arc<StickerPack>> {
        self.packs.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.packs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
