// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, path::PathBuf};

use pimdav_caldav::{
    CachedObject, CalDavBackend, CalendarBackend, Cancellable, ChangeSet, MemoryCache, ObjectId,
    ObjectReference, SyncToken,
};

use crate::config::Config;
use crate::state;

/// One configured collection with its local cache, shared by every command.
#[derive(Debug)]
pub struct Account {
    /// Engine talking to the server.
    pub backend: CalDavBackend,

    /// Local copy of the collection.
    pub cache: MemoryCache,

    /// Raised on Ctrl-C.
    pub cancel: Cancellable,

    state_file: PathBuf,
}

/// Counts of one applied refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
}

impl Account {
    /// Restores the cache and prepares the backend; nothing is sent yet.
    pub async fn open(config: Config) -> Result<Self, Box<dyn Error>> {
        let cache = state::load_cache(&config.state_file).await?;
        let cancel = Cancellable::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, cancelling");
                on_interrupt.cancel();
            }
        });

        Ok(Self {
            backend: CalDavBackend::new(config.caldav),
            cache,
            cancel,
            state_file: config.state_file,
        })
    }

    /// Persists the cache and drops the connection.
    pub async fn close(self) -> Result<(), Box<dyn Error>> {
        state::save_cache(&self.state_file, &self.cache).await?;
        self.backend.disconnect().await?;
        Ok(())
    }

    /// Runs refresh passes until the server is caught up.
    pub async fn sync(&self, full: bool) -> Result<SyncSummary, Box<dyn Error>> {
        let outcome = self.backend.connect(&self.cancel).await?;
        if full || outcome.params_changed {
            self.cache.set_sync_token(None);
        }

        let mut summary = SyncSummary::default();
        let mut is_repeat = false;
        loop {
            let since = self.cache.sync_token();
            let changes = self
                .backend
                .get_changes(&self.cache, since.as_ref(), is_repeat, &self.cancel)
                .await?;
            let applied = apply_changes(&self.cache, &changes);
            summary.created += applied.created;
            summary.modified += applied.modified;
            summary.removed += applied.removed;

            if !changes.needs_repeat || self.cancel.is_cancelled() {
                break;
            }
            is_repeat = true;
        }
        Ok(summary)
    }

    /// Cached master entry of a UID.
    pub fn cached(&self, uid: &str) -> Option<CachedObject> {
        self.cache.get(&ObjectId::master(uid))
    }

    /// Remembers an object as synced.
    pub fn remember(&self, reference: &ObjectReference) {
        if let Some(object) = &reference.object {
            self.cache.put(CachedObject::synced(
                reference.uid.clone(),
                reference.locator.clone(),
                object.clone(),
            ));
        }
    }

    /// Last persisted change tag.
    pub fn last_token(&self) -> Option<SyncToken> {
        self.cache.sync_token()
    }
}

/// Applies one change set to the cache and records its token.
pub fn apply_changes(cache: &MemoryCache, changes: &ChangeSet) -> SyncSummary {
    for id in &changes.removed {
        cache.remove(id);
    }
    for reference in changes.created.iter().chain(&changes.modified) {
        if let Some(object) = &reference.object {
            cache.put(CachedObject::synced(
                reference.uid.clone(),
                reference.locator.clone(),
                object.clone(),
            ));
        }
    }
    if let Some(token) = &changes.new_token {
        cache.set_sync_token(Some(token.clone()));
    }

    SyncSummary {
        created: changes.created.len(),
        modified: changes.modified.len(),
        removed: changes.removed.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pimdav_caldav::{ETag, Href};

    fn reference(uid: &str, etag: &str) -> ObjectReference {
        ObjectReference {
            uid: uid.to_string(),
            revision: ETag::from(etag),
            locator: Some(Href::from(format!("/cal/{uid}.ics"))),
            object: Some(format!(
                "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:{uid}\r\nX-PIMDAV-CALDAV-ETAG:{etag}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
            )),
        }
    }

    #[test]
    fn applies_every_kind_of_change() {
        let cache = MemoryCache::new();
        cache.put(CachedObject::synced("gone", None, String::new()));

        let changes = ChangeSet {
            new_token: Some(SyncToken::from("ctag-2")),
            created: vec![reference("a", "1")],
            modified: vec![reference("b", "2")],
            removed: vec![ObjectId::master("gone")],
            needs_repeat: false,
        };
        let summary = apply_changes(&cache, &changes);

        assert_eq!(
            summary,
            SyncSummary {
                created: 1,
                modified: 1,
                removed: 1
            }
        );
        assert!(cache.get(&ObjectId::master("gone")).is_none());
        let b = cache.get(&ObjectId::master("b")).unwrap();
        assert_eq!(b.revision, Some(ETag::from("2")));
        assert_eq!(cache.sync_token(), Some(SyncToken::from("ctag-2")));
    }

    #[test]
    fn keeps_token_when_none_is_reported() {
        let cache = MemoryCache::new();
        cache.set_sync_token(Some(SyncToken::from("old")));
        let changes = ChangeSet {
            created: vec![reference("a", "1")],
            needs_repeat: true,
            ..Default::default()
        };
        let _ = apply_changes(&cache, &changes);
        assert_eq!(cache.sync_token(), Some(SyncToken::from("old")));
        assert_eq!(cache.len(), 1);
    }
}
