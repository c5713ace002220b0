// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Transfer of single objects: load, save and remove.

use sha2::{Digest, Sha256};

use crate::cancel::Cancellable;
use crate::error::CalDavError;
use crate::http::Precondition;
use crate::ical;
use crate::probe::fetch_ctag;
use crate::schedule;
use crate::session::Session;
use crate::types::{ConflictResolution, ETag, Href, SyncToken};

/// An object read from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedObject {
    /// UID found in the body.
    pub uid: String,
    /// Address the object was read from.
    pub locator: Href,
    /// Server revision.
    pub revision: ETag,
    /// Body tagged with its revision.
    pub object: String,
}

/// Everything needed to store one object.
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    /// Master and overrides of one UID, as `VCALENDAR` texts or bare components.
    pub instances: Vec<String>,
    /// Current address; required when updating.
    pub locator: Option<Href>,
    /// Update an existing object instead of creating one.
    pub overwrite_existing: bool,
    /// Revision the update is based on; defaults to the marker in the object.
    pub prior_revision: Option<ETag>,
    /// Policy on a conflicting write.
    pub conflict_resolution: ConflictResolution,
    /// Ask the server not to send scheduling messages.
    pub silent: bool,
}

/// The stored state after a successful PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// UID of the object.
    pub uid: String,
    /// Address the object now lives at.
    pub locator: Href,
    /// New revision, if the server reported one.
    pub revision: Option<ETag>,
    /// Copy to keep locally; `None` means the caller must load the object again.
    pub object: Option<String>,
}

/// Result of [`save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The object was written.
    Stored(StoredObject),
    /// The write lost a conflict under [`ConflictResolution::KeepServer`]; nothing changed.
    KeptServerVersion,
}

/// Everything needed to remove one object.
#[derive(Debug, Clone, Default)]
pub struct RemoveRequest {
    /// UID of the object.
    pub uid: String,
    /// Last known address.
    pub locator: Option<Href>,
    /// Revision the removal is based on.
    pub prior_revision: Option<ETag>,
    /// Policy on a conflicting removal.
    pub conflict_resolution: ConflictResolution,
    /// Ask the server not to send scheduling messages.
    pub silent: bool,
}

/// Address a UID is stored at when the client chose it.
///
/// UIDs containing `/` are replaced by their SHA-256 so they cannot leave the collection.
pub(crate) fn derive_locator(collection: &str, uid: &str, with_extension: bool) -> Href {
    let name = if uid.contains('/') {
        hex::encode(Sha256::digest(uid.as_bytes()))
    } else {
        urlencoding::encode(uid).into_owned()
    };
    let extension = if with_extension { ".ics" } else { "" };
    Href::new(format!("{collection}{name}{extension}"))
}

fn candidate_locators(session: &Session, uid: &str, hint: Option<&Href>) -> Vec<Href> {
    let mut candidates: Vec<Href> = hint.cloned().into_iter().collect();
    let mut derived = vec![derive_locator(&session.collection, uid, true)];
    if !session.capabilities.quirks.limits_lookups() {
        derived.push(derive_locator(&session.collection, uid, false));
    }
    for locator in derived {
        if !candidates.iter().any(|c| c.same_resource(&locator)) {
            candidates.push(locator);
        }
    }
    candidates
}

/// Returns true if the collection change tag still equals `last_token`.
async fn collection_unchanged(
    session: &Session,
    last_token: Option<&SyncToken>,
    cancel: &Cancellable,
) -> Result<bool, CalDavError> {
    let Some(last) = last_token else {
        return Ok(false);
    };
    if !session.ctag_supported() {
        return Ok(false);
    }
    let unchanged = fetch_ctag(&session.http, &session.collection)
        .await
        .is_ok_and(|token| token == *last);
    cancel.check()?;
    Ok(unchanged)
}

/// Reads one object, trying the hint first and then the derived addresses.
///
/// The derived addresses are skipped when the collection did not change since
/// `last_token`, both without a hint and after a stale hint.
///
/// # Errors
///
/// `NotFound` when no candidate exists, `InvalidObject` when the answer lacks
/// an `ETag` or does not parse.
pub(crate) async fn load(
    session: &Session,
    uid: &str,
    hint: Option<&Href>,
    last_token: Option<&SyncToken>,
    cancel: &Cancellable,
) -> Result<LoadedObject, CalDavError> {
    cancel.check()?;

    // An unchanged collection cannot contain an object the cache does not know.
    if hint.is_none() && collection_unchanged(session, last_token, cancel).await? {
        return Err(CalDavError::NotFound(uid.to_string()));
    }

    for (attempt, locator) in candidate_locators(session, uid, hint).into_iter().enumerate() {
        match session.http.get(&locator).await {
            Ok(response) => {
                let revision = response.etag.ok_or_else(|| {
                    CalDavError::InvalidObject(format!("no ETag returned for {locator}"))
                })?;
                let (found_uid, object) = ical::tag_with_revision(&response.body, &revision)?;
                return Ok(LoadedObject {
                    uid: found_uid.unwrap_or_else(|| uid.to_string()),
                    locator,
                    revision,
                    object,
                });
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(%locator, "object not at candidate address");
                cancel.check()?;
                let stale_hint = attempt == 0 && hint.is_some();
                if stale_hint && collection_unchanged(session, last_token, cancel).await? {
                    return Err(CalDavError::NotFound(uid.to_string()));
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(CalDavError::NotFound(uid.to_string()))
}

/// Stores one object under a conditional write.
///
/// # Errors
///
/// `OutOfSync` when the precondition fails and the policy does not absorb it,
/// `InvalidObject` when an update lacks its address or the object has no UID.
pub(crate) async fn save(
    session: &Session,
    request: SaveRequest,
    cancel: &Cancellable,
) -> Result<SaveOutcome, CalDavError> {
    cancel.check()?;

    let mut comp = ical::merge_instances(&request.instances)?;
    let marker = request.instances.iter().find_map(|t| ical::revision_of(t));
    ical::remove_revision_marker(&mut comp);
    let uid = ical::object_uid(&comp)
        .ok_or_else(|| CalDavError::InvalidObject("object without UID".to_string()))?;

    let creating = !request.overwrite_existing;
    let locator = match (creating, request.locator) {
        (_, Some(locator)) => locator,
        (true, None) => derive_locator(&session.collection, &uid, true),
        (false, None) => {
            return Err(CalDavError::InvalidObject(format!(
                "no address known for existing object {uid}"
            )));
        }
    };

    let precondition = if creating {
        Precondition::IfNoneMatch
    } else {
        match (request.conflict_resolution, request.prior_revision.or(marker)) {
            (ConflictResolution::KeepLocal, _) => Precondition::None,
            (_, Some(revision)) => Precondition::IfMatch(revision),
            // Without a known revision the write may only succeed on a vanished object.
            (_, None) => Precondition::IfNoneMatch,
        }
    };

    let suppressed = schedule::maybe_suppress(
        &mut comp,
        session.capabilities.scheduling,
        session.config.auto_schedule,
        request.silent,
        creating,
    );

    let response = match session
        .http
        .put(&locator, &precondition, comp.to_string())
        .await
    {
        Ok(response) => response,
        Err(CalDavError::PreconditionFailed(url)) => {
            return if request.conflict_resolution == ConflictResolution::KeepServer {
                tracing::info!(%uid, "server copy kept");
                Ok(SaveOutcome::KeptServerVersion)
            } else {
                Err(CalDavError::OutOfSync(url))
            };
        }
        Err(e) => return Err(e),
    };

    // Only a strong tag proves the server stored exactly these bytes.
    let object = match response.etag.as_ref().filter(|e| !e.is_weak()) {
        Some(etag) => {
            ical::set_revision_marker(&mut comp, etag);
            if suppressed {
                ical::remove_schedule_agent(&mut comp);
            }
            Some(comp.to_string())
        }
        None => None,
    };

    Ok(SaveOutcome::Stored(StoredObject {
        uid,
        locator: response.locator,
        revision: response.etag,
        object,
    }))
}

/// Removes one object; an object that is already gone counts as removed.
///
/// # Errors
///
/// `OutOfSync` when the precondition fails and the policy does not absorb it.
pub(crate) async fn remove(
    session: &Session,
    request: RemoveRequest,
    cancel: &Cancellable,
) -> Result<(), CalDavError> {
    cancel.check()?;

    let precondition = match (request.conflict_resolution, request.prior_revision) {
        (ConflictResolution::KeepLocal, _) | (_, None) => Precondition::None,
        (_, Some(revision)) => Precondition::IfMatch(revision),
    };
    let suppress_reply = request.silent
        || !schedule::save_schedules_enabled(
            session.capabilities.scheduling,
            session.config.auto_schedule,
        );

    for locator in candidate_locators(session, &request.uid, request.locator.as_ref()) {
        match session
            .http
            .delete(&locator, &precondition, suppress_reply)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(%locator, "nothing to remove at candidate address");
                cancel.check()?;
            }
            Err(CalDavError::PreconditionFailed(url)) => {
                return if request.conflict_resolution == ConflictResolution::KeepServer {
                    tracing::info!(uid = %request.uid, "server copy kept");
                    Ok(())
                } else {
                    Err(CalDavError::OutOfSync(url))
                };
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(uid = %request.uid, "object already gone");
    Ok(())
}
