// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Interface to the persistent local object cache.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::ical;
use crate::types::{ETag, Href, OfflineState, SyncToken};

/// Key of one cached instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ObjectId {
    /// Object UID.
    pub uid: String,
    /// Recurrence id of an override, `None` for the master.
    pub recurrence_id: Option<String>,
}

impl ObjectId {
    /// Returns the id of a master instance.
    #[must_use]
    pub fn master(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            recurrence_id: None,
        }
    }
}

/// One cached instance with its synchronization metadata.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CachedObject {
    /// Object UID.
    pub uid: String,
    /// Recurrence id of an override.
    #[serde(default)]
    pub recurrence_id: Option<String>,
    /// Server revision of the stored copy.
    #[serde(default)]
    pub revision: Option<ETag>,
    /// Server address of the stored copy.
    #[serde(default)]
    pub locator: Option<Href>,
    /// Object text.
    pub object: String,
    /// Local modification state.
    #[serde(default)]
    pub offline_state: OfflineState,
}

impl CachedObject {
    /// Creates a synced master entry, reading the revision from the object's marker.
    #[must_use]
    pub fn synced(uid: impl Into<String>, locator: Option<Href>, object: String) -> Self {
        Self {
            uid: uid.into(),
            recurrence_id: None,
            revision: ical::revision_of(&object),
            locator,
            object,
            offline_state: OfflineState::Synced,
        }
    }

    /// Returns the cache key.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        ObjectId {
            uid: self.uid.clone(),
            recurrence_id: self.recurrence_id.clone(),
        }
    }

    /// Returns the revision, falling back to the marker inside the object text.
    #[must_use]
    pub fn current_revision(&self) -> Option<ETag> {
        self.revision
            .clone()
            .or_else(|| ical::revision_of(&self.object))
    }
}

/// Narrow view of the local cache used by the synchronization engine.
pub trait ObjectCache: Send + Sync {
    /// Returns the object stored at a locator, preferring the master instance.
    fn lookup_by_locator(&self, locator: &Href) -> Option<CachedObject>;

    /// Returns every object matching a predicate.
    fn search(
        &self,
        predicate: &dyn Fn(&CachedObject) -> bool,
    ) -> Box<dyn Iterator<Item = CachedObject> + '_>;

    /// Returns the ids of every instance stored at a locator.
    fn ids_with_locator(&self, locator: &Href) -> Vec<ObjectId>;
}

/// Serializable content of a [`MemoryCache`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CacheSnapshot {
    /// Last collection change tag.
    #[serde(default)]
    pub sync_token: Option<SyncToken>,
    /// Cached objects.
    #[serde(default)]
    pub objects: Vec<CachedObject>,
}

/// In-memory [`ObjectCache`] for tests and the command-line driver.
#[derive(Debug, Default)]
pub struct MemoryCache {
    objects: RwLock<HashMap<ObjectId, CachedObject>>,
    sync_token: RwLock<Option<SyncToken>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a cache from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let objects = snapshot
            .objects
            .into_iter()
            .map(|o| (o.id(), o))
            .collect();
        Self {
            objects: RwLock::new(objects),
            sync_token: RwLock::new(snapshot.sync_token),
        }
    }

    /// Captures the cache content.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut objects: Vec<_> = self.objects.read().values().cloned().collect();
        objects.sort_by(|a, b| (&a.uid, &a.recurrence_id).cmp(&(&b.uid, &b.recurrence_id)));
        CacheSnapshot {
            sync_token: self.sync_token.read().clone(),
            objects,
        }
    }

    /// Inserts or replaces an object.
    pub fn put(&self, object: CachedObject) {
        self.objects.write().insert(object.id(), object);
    }

    /// Returns an object by id.
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<CachedObject> {
        self.objects.read().get(id).cloned()
    }

    /// Removes an object by id.
    pub fn remove(&self, id: &ObjectId) -> Option<CachedObject> {
        self.objects.write().remove(id)
    }

    /// Removes every instance of a UID.
    pub fn remove_uid(&self, uid: &str) {
        self.objects.write().retain(|id, _| id.uid != uid);
    }

    /// Number of cached instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Returns the persisted change tag.
    #[must_use]
    pub fn sync_token(&self) -> Option<SyncToken> {
        self.sync_token.read().clone()
    }

    /// Replaces the persisted change tag.
    pub fn set_sync_token(&self, token: Option<SyncToken>) {
        *self.sync_token.write() = token;
    }
}

impl ObjectCache for MemoryCache {
    fn lookup_by_locator(&self, locator: &Href) -> Option<CachedObject> {
        let objects = self.objects.read();
        let mut found: Option<&CachedObject> = None;
        for obj in objects.values() {
            if obj.locator.as_ref().is_some_and(|l| l.same_resource(locator)) {
                if obj.recurrence_id.is_none() {
                    return Some(obj.clone());
                }
                if found.is_none() {
                    found = Some(obj);
                }
            }
        }
        found.cloned()
    }

    fn search(
        &self,
        predicate: &dyn Fn(&CachedObject) -> bool,
    ) -> Box<dyn Iterator<Item = CachedObject> + '_> {
        let matched: Vec<_> = self
            .objects
            .read()
            .values()
            .filter(|o| predicate(*o))
            .cloned()
            .collect();
        Box::new(matched.into_iter())
    }

    fn ids_with_locator(&self, locator: &Href) -> Vec<ObjectId> {
        self.objects
            .read()
            .values()
            .filter(|o| o.locator.as_ref().is_some_and(|l| l.same_resource(locator)))
            .map(CachedObject::id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(uid: &str, rid: Option<&str>, locator: &str) -> CachedObject {
        CachedObject {
            uid: uid.to_string(),
            recurrence_id: rid.map(str::to_string),
            revision: Some(ETag::from("1")),
            locator: Some(Href::from(locator)),
            object: String::new(),
            offline_state: OfflineState::Synced,
        }
    }

    #[test]
    fn lookup_prefers_master() {
        let cache = MemoryCache::new();
        cache.put(entry("a", Some("20250101T000000Z"), "/c/a.ics"));
        cache.put(entry("a", None, "/c/a.ics"));
        let found = cache.lookup_by_locator(&Href::from("/c/a.ics")).unwrap();
        assert_eq!(found.recurrence_id, None);
        assert_eq!(cache.ids_with_locator(&Href::from("/c/a.ics")).len(), 2);
        assert!(cache.lookup_by_locator(&Href::from("/c/b.ics")).is_none());
    }

    #[test]
    fn snapshot_roundtrip() {
        let cache = MemoryCache::new();
        cache.put(entry("a", None, "/c/a.ics"));
        cache.set_sync_token(Some(SyncToken::from("ctag-1")));

        let json = serde_json::to_string(&cache.snapshot()).unwrap();
        let restored = MemoryCache::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.sync_token(), Some(SyncToken::from("ctag-1")));
        assert!(restored.get(&ObjectId::master("a")).is_some());
    }

    #[test]
    fn search_filters() {
        let cache = MemoryCache::new();
        cache.put(entry("a", None, "/c/a.ics"));
        let mut local = entry("b", None, "/c/b.ics");
        local.offline_state = OfflineState::LocallyCreated;
        cache.put(local);
        let synced: Vec<_> = cache
            .search(&|o| o.offline_state == OfflineState::Synced)
            .collect();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].uid, "a");
    }
}
