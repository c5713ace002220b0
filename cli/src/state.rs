// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, path::Path};

use pimdav_caldav::{CacheSnapshot, MemoryCache};
use tokio::fs;

/// Restores the cache from its snapshot; a missing file yields an empty cache.
#[tracing::instrument]
pub async fn load_cache(path: &Path) -> Result<MemoryCache, Box<dyn Error>> {
    if !fs::try_exists(path).await? {
        tracing::debug!("no snapshot yet, starting empty");
        return Ok(MemoryCache::new());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read state file at {}: {}", path.display(), e))?;
    let snapshot: CacheSnapshot = serde_json::from_str(&content)
        .map_err(|e| format!("Corrupted state file at {}: {}", path.display(), e))?;
    Ok(MemoryCache::from_snapshot(snapshot))
}

/// Writes the cache snapshot, creating parent directories as needed.
#[tracing::instrument(skip(cache))]
pub async fn save_cache(path: &Path, cache: &MemoryCache) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(&cache.snapshot())?;
    fs::write(path, content).await?;
    tracing::debug!(objects = cache.len(), "snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pimdav_caldav::{CachedObject, Href, ObjectId, SyncToken};
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = load_cache(&dir.path().join("none.json")).await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.sync_token(), None);
    }

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state.json");

        let cache = MemoryCache::new();
        cache.put(CachedObject::synced(
            "a",
            Some(Href::from("/cal/a.ics")),
            "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n".to_string(),
        ));
        cache.set_sync_token(Some(SyncToken::from("ctag-7")));
        save_cache(&path, &cache).await.unwrap();

        let restored = load_cache(&path).await.unwrap();
        assert_eq!(restored.sync_token(), Some(SyncToken::from("ctag-7")));
        let entry = restored.get(&ObjectId::master("a")).unwrap();
        assert_eq!(entry.locator, Some(Href::from("/cal/a.ics")));
    }

    #[tokio::test]
    async fn corrupted_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_cache(&path).await.unwrap_err();
        assert!(err.to_string().contains("Corrupted"));
    }
}
