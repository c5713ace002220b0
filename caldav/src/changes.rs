// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Change detection between the local cache and the collection.

use std::collections::HashMap;

use jiff::{SignedDuration, Timestamp};

use crate::cache::{CachedObject, ObjectCache, ObjectId};
use crate::cancel::Cancellable;
use crate::error::CalDavError;
use crate::fetch::fetch_bodies;
use crate::http::Depth;
use crate::ical::{self, Component};
use crate::probe::fetch_ctag;
use crate::request::{CalendarQueryRequest, QueryData};
use crate::response::MultiStatusResponse;
use crate::session::Session;
use crate::types::{ChangeClassification, Href, ObjectReference, OfflineState, SyncToken};

const ICAL_UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Result of one refresh pass.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Token to persist once the changes are applied; `None` keeps the stored one.
    pub new_token: Option<SyncToken>,
    /// Objects only present on the server, with bodies.
    pub created: Vec<ObjectReference>,
    /// Objects changed on the server. `object` is `None` when the body could
    /// not be retrieved; such entries still carry the cached UID.
    pub modified: Vec<ObjectReference>,
    /// Cached instances no longer present on the server.
    pub removed: Vec<ObjectId>,
    /// The caller should call again at once with `is_repeat` set.
    pub needs_repeat: bool,
}

impl ChangeSet {
    fn unchanged(token: SyncToken) -> Self {
        Self {
            new_token: Some(token),
            ..Self::default()
        }
    }

    /// Returns true if nothing has to be applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Returns how this pass classified a UID.
    #[must_use]
    pub fn classification(&self, uid: &str) -> ChangeClassification {
        if self.created.iter().any(|r| r.uid == uid) {
            ChangeClassification::Created
        } else if self.modified.iter().any(|r| r.uid == uid) {
            ChangeClassification::Modified
        } else if self.removed.iter().any(|id| id.uid == uid) {
            ChangeClassification::Removed
        } else {
            ChangeClassification::Unchanged
        }
    }
}

/// Diff of one listing against the cache, before any body is fetched.
#[derive(Debug, Default)]
pub(crate) struct Classified {
    pub(crate) created: Vec<ObjectReference>,
    pub(crate) modified: Vec<ObjectReference>,
    pub(crate) removed: Vec<ObjectId>,
}

/// Computes what changed since `since`.
///
/// The first pass (`is_repeat == false`) only lists a window around now and
/// asks for a repeat; the repeat pass lists everything, may report removals and
/// carries the new token.
///
/// # Errors
///
/// Listing and fetch failures are returned; a failing change tag is not.
pub(crate) async fn get_changes(
    session: &Session,
    cache: &dyn ObjectCache,
    since: Option<&SyncToken>,
    is_repeat: bool,
    cancel: &Cancellable,
) -> Result<ChangeSet, CalDavError> {
    cancel.check()?;

    let mut current_token = None;
    if session.ctag_supported() {
        match fetch_ctag(&session.http, &session.collection).await {
            Ok(token) if !is_repeat && since == Some(&token) => {
                tracing::debug!(%token, "collection unchanged");
                return Ok(ChangeSet::unchanged(token));
            }
            Ok(token) => current_token = Some(token),
            Err(e) => {
                cancel.check()?;
                tracing::warn!(error = %e, "change tag unusable, listing the whole collection");
                session.disable_ctag();
            }
        }
        cancel.check()?;
    }

    let mut query = CalendarQueryRequest::new(session.config.component);
    if !is_repeat {
        let (start, end) = refresh_window(Timestamp::now(), session.config.refresh_window_weeks)?;
        query = query.time_range(start, Some(end));
    }
    let multistatus = session
        .http
        .report(&session.collection, Depth::One, query.build()?)
        .await?;
    cancel.check()?;

    let listing = listing_entries(&session.collection, &multistatus);
    tracing::debug!(entries = listing.len(), bounded = !is_repeat, "collection listed");

    let Classified {
        mut created,
        mut modified,
        mut removed,
    } = classify(cache, listing, !is_repeat);

    let mut unresolved = Vec::new();
    let mut cancelled = false;
    let mut incomplete = false;
    for (refs, keep_failed) in [(&mut created, false), (&mut modified, true)] {
        if cancelled || cancel.is_cancelled() {
            cancelled = true;
            refs.clear();
            continue;
        }
        let outcome = fetch_bodies(session, refs, cancel).await?;
        unresolved.extend(outcome.removed);
        incomplete |= !outcome.failed.is_empty();
        if keep_failed {
            // Known from the cache; the caller reloads them later.
            refs.extend(outcome.failed.into_iter().map(|mut entry| {
                entry.object = None;
                entry
            }));
        }
        cancelled = outcome.cancelled;
    }
    if incomplete {
        tracing::warn!("some objects could not be retrieved, keeping the stored token");
    }

    for entry in unresolved {
        let ids = entry
            .locator
            .as_ref()
            .map(|l| cache.ids_with_locator(l))
            .unwrap_or_default();
        if ids.is_empty() && !entry.uid.is_empty() {
            push_unique(&mut removed, ObjectId::master(entry.uid));
        }
        for id in ids {
            push_unique(&mut removed, id);
        }
    }

    tracing::debug!(
        created = created.len(),
        modified = modified.len(),
        removed = removed.len(),
        cancelled,
        "changes computed"
    );

    Ok(ChangeSet {
        new_token: if is_repeat && !cancelled && !incomplete {
            current_token
        } else {
            None
        },
        created,
        modified,
        removed,
        needs_repeat: !is_repeat || cancelled,
    })
}

/// Lists every object of the collection with its UID, without diffing.
///
/// # Errors
///
/// Returns the listing failure.
pub(crate) async fn list_existing(
    session: &Session,
    cancel: &Cancellable,
) -> Result<Vec<ObjectReference>, CalDavError> {
    cancel.check()?;
    let query = CalendarQueryRequest::new(session.config.component).data(QueryData::Uid);
    let multistatus = session
        .http
        .report(&session.collection, Depth::One, query.build()?)
        .await?;
    cancel.check()?;

    let mut existing = Vec::new();
    for item in &multistatus.responses {
        if is_collection_entry(&session.collection, &item.href) {
            continue;
        }
        let Some(props) = item.ok_props() else {
            continue;
        };
        let Some(revision) = props.get_etag.clone() else {
            continue;
        };
        let uid = props
            .calendar_data
            .as_deref()
            .and_then(|data| Component::parse(data).ok())
            .and_then(|comp| ical::object_uid(&comp));
        match uid {
            Some(uid) => existing.push(ObjectReference {
                uid,
                revision,
                locator: Some(item.href.clone()),
                object: None,
            }),
            None => tracing::debug!(href = %item.href, "listed object without UID"),
        }
    }
    Ok(existing)
}

/// Diffs a listing against the cache.
///
/// Overrides and locally created objects are not compared. Removals are only
/// reported for an unbounded listing.
pub(crate) fn classify(
    cache: &dyn ObjectCache,
    listing: Vec<ObjectReference>,
    bounded: bool,
) -> Classified {
    let mut remote: HashMap<String, ObjectReference> = HashMap::with_capacity(listing.len());
    let mut order = Vec::with_capacity(listing.len());
    for entry in listing {
        if let Some(locator) = &entry.locator {
            let key = locator.decoded_path();
            if remote.insert(key.clone(), entry).is_none() {
                order.push(key);
            }
        }
    }

    let mut classified = Classified::default();
    let comparable = |o: &CachedObject| {
        o.recurrence_id.is_none()
            && o.locator.is_some()
            && o.offline_state != OfflineState::LocallyCreated
    };
    for cached in cache.search(&comparable) {
        let Some(locator) = &cached.locator else {
            continue;
        };
        match remote.remove(&locator.decoded_path()) {
            Some(entry) if cached.current_revision().as_ref() == Some(&entry.revision) => {}
            Some(mut entry) => {
                entry.uid.clone_from(&cached.uid);
                classified.modified.push(entry);
            }
            None if !bounded => {
                for id in cache.ids_with_locator(locator) {
                    push_unique(&mut classified.removed, id);
                }
            }
            None => {}
        }
    }

    classified.created = order
        .into_iter()
        .filter_map(|key| remote.remove(&key))
        .collect();
    classified
}

fn listing_entries(collection: &str, multistatus: &MultiStatusResponse) -> Vec<ObjectReference> {
    multistatus
        .responses
        .iter()
        .filter(|item| !is_collection_entry(collection, &item.href))
        .filter_map(|item| {
            let revision = item.ok_props()?.get_etag.clone()?;
            Some(ObjectReference::listed(item.href.clone(), revision))
        })
        .collect()
}

/// Some servers list the collection itself among its members.
fn is_collection_entry(collection: &str, href: &Href) -> bool {
    href.is_collection() || href.decoded_path().trim_end_matches('/') == collection.trim_end_matches('/')
}

/// Window `[now - weeks, now + weeks]` formatted for a `time-range` filter.
fn refresh_window(now: Timestamp, weeks: u32) -> Result<(String, String), CalDavError> {
    let half = SignedDuration::from_hours(i64::from(weeks) * 7 * 24);
    let bound = |r: Result<Timestamp, jiff::Error>| {
        r.map(|t| t.strftime(ICAL_UTC_FORMAT).to_string())
            .map_err(|e| CalDavError::Config(format!("refresh window of {weeks} weeks: {e}")))
    };
    Ok((bound(now.checked_sub(half))?, bound(now.checked_add(half))?))
}

fn push_unique(ids: &mut Vec<ObjectId>, id: ObjectId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::types::ETag;

    fn cached(uid: &str, path: &str, revision: &str) -> CachedObject {
        CachedObject {
            revision: Some(ETag::from(revision)),
            ..CachedObject::synced(uid, Some(Href::from(path)), String::new())
        }
    }

    fn listed(path: &str, revision: &str) -> ObjectReference {
        ObjectReference::listed(Href::from(path), ETag::from(revision))
    }

    fn uids(refs: &[ObjectReference]) -> Vec<&str> {
        refs.iter().map(|r| r.uid.as_str()).collect()
    }

    #[test]
    fn classifies_each_side() {
        let cache = MemoryCache::new();
        cache.put(cached("same", "/c/same.ics", "1"));
        cache.put(cached("changed", "/c/changed.ics", "1"));
        cache.put(cached("gone", "/c/gone.ics", "1"));

        let listing = vec![
            listed("/c/same.ics", "\"1\""),
            listed("/c/changed.ics", "2"),
            listed("/c/new.ics", "1"),
        ];
        let c = classify(&cache, listing, false);

        assert_eq!(uids(&c.modified), ["changed"]);
        assert_eq!(c.modified[0].revision.as_str(), "2");
        assert_eq!(c.created.len(), 1);
        assert_eq!(c.created[0].locator.as_ref().unwrap().as_str(), "/c/new.ics");
        assert_eq!(c.removed, [ObjectId::master("gone")]);
    }

    #[test]
    fn bounded_listing_never_removes() {
        let cache = MemoryCache::new();
        cache.put(cached("outside", "/c/outside.ics", "1"));
        let c = classify(&cache, Vec::new(), true);
        assert!(c.removed.is_empty());
        assert!(c.created.is_empty());
    }

    #[test]
    fn skips_overrides_and_local_creations() {
        let cache = MemoryCache::new();
        cache.put(CachedObject {
            recurrence_id: Some("20250101T100000Z".into()),
            ..cached("rec", "/c/rec.ics", "1")
        });
        cache.put(CachedObject {
            offline_state: OfflineState::LocallyCreated,
            ..cached("local", "/c/local.ics", "1")
        });
        let c = classify(&cache, Vec::new(), false);
        assert!(c.removed.is_empty());
    }

    #[test]
    fn vanished_master_takes_its_overrides_along() {
        let cache = MemoryCache::new();
        cache.put(cached("r", "/c/r.ics", "1"));
        cache.put(CachedObject {
            recurrence_id: Some("20250101T100000Z".into()),
            ..cached("r", "/c/r.ics", "1")
        });

        let c = classify(&cache, Vec::new(), false);
        assert_eq!(c.removed.len(), 2);
        assert!(c.removed.contains(&ObjectId::master("r")));
        assert!(c.removed.contains(&ObjectId {
            uid: "r".to_string(),
            recurrence_id: Some("20250101T100000Z".to_string()),
        }));
    }

    #[test]
    fn matches_differently_escaped_locators() {
        let cache = MemoryCache::new();
        cache.put(cached("at", "/c/a%40b.ics", "1"));
        let c = classify(&cache, vec![listed("/c/a@b.ics", "1")], false);
        assert!(c.created.is_empty() && c.modified.is_empty() && c.removed.is_empty());
    }

    #[test]
    fn collection_self_entry() {
        assert!(is_collection_entry("/c/", &Href::from("/c/")));
        assert!(is_collection_entry("/c/", &Href::from("/c")));
        assert!(is_collection_entry("/c/", &Href::from("/c/sub/")));
        assert!(!is_collection_entry("/c/", &Href::from("/c/a.ics")));
    }

    #[test]
    fn window_is_symmetric_around_now() {
        let now: Timestamp = "2025-03-01T12:00:00Z".parse().unwrap();
        let (start, end) = refresh_window(now, 5).unwrap();
        assert_eq!(start, "20250125T120000Z");
        assert_eq!(end, "20250405T120000Z");
    }
}
