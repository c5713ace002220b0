// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Retrieval of full object bodies for listed references.

use std::borrow::Cow;

use crate::cancel::Cancellable;
use crate::error::CalDavError;
use crate::http::Depth;
use crate::ical;
use crate::request::CalendarMultiGetRequest;
use crate::session::Session;
use crate::types::{ETag, Href, ObjectReference};

/// Largest number of hrefs sent in one `calendar-multiget`.
pub const MAX_MULTIGET: usize = 100;

/// What [`fetch_bodies`] could not populate.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// References the server reports as gone, or whose body carries no UID.
    pub removed: Vec<ObjectReference>,
    /// References whose body could not be retrieved this time.
    pub failed: Vec<ObjectReference>,
    /// Cancellation stopped the fetch; unfetched references were dropped.
    pub cancelled: bool,
}

impl FetchOutcome {
    fn settle(&mut self, fetched: &mut Vec<ObjectReference>, entry: ObjectReference, gone: bool) {
        if is_populated(&entry) {
            fetched.push(entry);
        } else if gone {
            self.removed.push(entry);
        } else {
            self.failed.push(entry);
        }
    }
}

/// Fills `uid` and `object` of every reference, keeping only populated ones.
///
/// Only a 404 or a body without a UID counts as removed. Any other per-object
/// failure, or an href the server leaves out of its answer, lands in `failed`.
///
/// # Errors
///
/// Fails when a whole request fails; a single object never fails the batch.
pub(crate) async fn fetch_bodies(
    session: &Session,
    refs: &mut Vec<ObjectReference>,
    cancel: &Cancellable,
) -> Result<FetchOutcome, CalDavError> {
    cancel.check()?;
    let pending = std::mem::take(refs);
    let mut outcome = FetchOutcome::default();

    let (pending, unaddressed): (Vec<_>, Vec<_>) =
        pending.into_iter().partition(|r| r.locator.is_some());
    outcome.failed.extend(unaddressed);

    if session.capabilities.quirks.avoids_multiget() {
        fetch_one_by_one(session, pending, refs, &mut outcome, cancel).await?;
    } else {
        let mut pending = pending.into_iter();
        loop {
            let chunk: Vec<_> = pending.by_ref().take(MAX_MULTIGET).collect();
            if chunk.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            tracing::debug!(count = chunk.len(), "fetching bodies");
            multiget(session, chunk, refs, &mut outcome).await?;
        }
    }

    tracing::debug!(
        fetched = refs.len(),
        removed = outcome.removed.len(),
        failed = outcome.failed.len(),
        cancelled = outcome.cancelled,
        "bodies fetched"
    );
    Ok(outcome)
}

async fn multiget(
    session: &Session,
    mut chunk: Vec<ObjectReference>,
    fetched: &mut Vec<ObjectReference>,
    outcome: &mut FetchOutcome,
) -> Result<(), CalDavError> {
    let mut request = CalendarMultiGetRequest::new();
    for locator in chunk.iter().filter_map(|r| r.locator.as_ref()) {
        request.add_href(locator.path().to_string());
    }
    let multistatus = session
        .http
        .report(&session.collection, Depth::One, request.build()?)
        .await?;

    // Servers usually answer in request order; the cursor makes that case linear.
    let mut gone = vec![false; chunk.len()];
    let mut cursor = 0;
    for item in &multistatus.responses {
        let Some(idx) = match_response(&chunk, cursor, &item.href) else {
            tracing::warn!(href = %item.href, "multiget answered an href that was not requested");
            continue;
        };
        cursor = idx + 1;

        if item.is_not_found() {
            gone[idx] = true;
            continue;
        }
        let Some(data) = item.ok_props().and_then(|p| p.calendar_data.as_deref()) else {
            tracing::debug!(href = %item.href, status = ?item.status, "multiget entry without data");
            continue;
        };
        let etag = item.ok_props().and_then(|p| p.get_etag.clone());
        if let Some(entry) = chunk.get_mut(idx) {
            populate(entry, data, etag);
            gone[idx] = !is_populated(entry);
        }
    }

    for (entry, gone) in chunk.into_iter().zip(gone) {
        outcome.settle(fetched, entry, gone);
    }
    Ok(())
}

fn match_response(chunk: &[ObjectReference], cursor: usize, href: &Href) -> Option<usize> {
    let matches = |r: &ObjectReference| r.locator.as_ref().is_some_and(|l| l.same_resource(href));
    if chunk.get(cursor).is_some_and(matches) {
        Some(cursor)
    } else {
        chunk.iter().position(matches)
    }
}

/// Retrieval for servers whose multiget answers cannot be trusted.
async fn fetch_one_by_one(
    session: &Session,
    pending: Vec<ObjectReference>,
    fetched: &mut Vec<ObjectReference>,
    outcome: &mut FetchOutcome,
    cancel: &Cancellable,
) -> Result<(), CalDavError> {
    for mut entry in pending {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        let Some(locator) = entry.locator.clone() else {
            outcome.failed.push(entry);
            continue;
        };

        let mut response = None;
        if locator.contains('%') {
            let escaped = reescape_path(locator.path());
            if escaped != locator.path() {
                match session.http.get(&escaped).await {
                    Ok(r) => {
                        entry.locator = Some(Href::new(escaped));
                        response = Some(r);
                    }
                    Err(e) if e.is_authentication() => return Err(e),
                    Err(e) => tracing::debug!(error = %e, "re-escaped GET failed"),
                }
            }
        }

        let response = match response {
            Some(r) => r,
            None => match session.http.get(&locator).await {
                Ok(r) => r,
                Err(e) if e.is_not_found() => {
                    outcome.removed.push(entry);
                    continue;
                }
                Err(e) if e.is_authentication() => return Err(e),
                Err(e) => {
                    tracing::warn!(%locator, error = %e, "object could not be retrieved");
                    outcome.failed.push(entry);
                    continue;
                }
            },
        };

        populate(&mut entry, &response.body, response.etag);
        outcome.settle(fetched, entry, true);
    }
    Ok(())
}

/// Re-escapes each path segment, leaving `@` literal.
fn reescape_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment));
            urlencoding::encode(&decoded).replace("%40", "@")
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn populate(entry: &mut ObjectReference, body: &str, etag: Option<ETag>) {
    let revision = etag.unwrap_or_else(|| entry.revision.clone());
    match ical::tag_with_revision(body, &revision) {
        Ok((Some(uid), text)) => {
            entry.uid = uid;
            entry.revision = revision;
            entry.object = Some(text);
        }
        Ok((None, _)) => tracing::debug!(locator = ?entry.locator, "object without UID"),
        Err(e) => tracing::debug!(locator = ?entry.locator, error = %e, "unparsable object"),
    }
}

fn is_populated(entry: &ObjectReference) -> bool {
    entry.object.is_some() && !entry.uid.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(path: &str) -> ObjectReference {
        ObjectReference::listed(Href::from(path), ETag::from("1"))
    }

    #[test]
    fn cursor_then_linear_scan() {
        let chunk = vec![listed("/c/a.ics"), listed("/c/b.ics"), listed("/c/c.ics")];
        assert_eq!(match_response(&chunk, 0, &Href::from("/c/a.ics")), Some(0));
        assert_eq!(match_response(&chunk, 1, &Href::from("/c/c.ics")), Some(2));
        assert_eq!(match_response(&chunk, 3, &Href::from("/c/b.ics")), Some(1));
        assert_eq!(
            match_response(&chunk, 0, &Href::from("https://h.example/c/b.ics")),
            Some(1)
        );
        assert_eq!(match_response(&chunk, 0, &Href::from("/c/z.ics")), None);
    }

    #[test]
    fn reescape_keeps_at_sign() {
        assert_eq!(
            reescape_path("/cal/user%40example.com/a%20b.ics"),
            "/cal/user@example.com/a%20b.ics"
        );
        assert_eq!(reescape_path("/cal/plain.ics"), "/cal/plain.ics");
    }

    #[test]
    fn populate_reads_uid_and_tags_revision() {
        let mut entry = listed("/c/a.ics");
        let body = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:u-1\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        populate(&mut entry, body, Some(ETag::from("\"7\"")));
        assert!(is_populated(&entry));
        assert_eq!(entry.uid, "u-1");
        assert_eq!(entry.revision.as_str(), "7");
        assert!(
            entry
                .object
                .as_deref()
                .is_some_and(|o| o.contains("X-PIMDAV-CALDAV-ETAG:7"))
        );
    }

    #[test]
    fn populate_without_uid_leaves_entry_empty() {
        let mut entry = listed("/c/a.ics");
        populate(&mut entry, "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n", None);
        assert!(!is_populated(&entry));
    }

    mod one_by_one {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use super::listed;
        use crate::cancel::Cancellable;
        use crate::config::CalDavConfig;
        use crate::fetch::fetch_bodies;
        use crate::http::HttpClient;
        use crate::session::Session;
        use crate::types::{Capabilities, Href, ServerQuirks};

        fn event(uid: &str) -> String {
            format!("BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:{uid}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n")
        }

        async fn mount_get(server: &MockServer, at: &str, response: ResponseTemplate) {
            Mock::given(method("GET"))
                .and(path(at))
                .respond_with(response)
                .mount(server)
                .await;
        }

        fn icloud_session(server: &MockServer) -> Session {
            let config = CalDavConfig {
                base_url: server.uri(),
                collection: "/cal/alice/".to_string(),
                ..Default::default()
            };
            let http = HttpClient::new(&config).unwrap();
            let capabilities = Capabilities {
                quirks: ServerQuirks::ICloud,
                ..Default::default()
            };
            Session::new(http, config, capabilities)
        }

        #[tokio::test]
        async fn gets_each_object_and_sorts_out_failures() {
            let server = MockServer::start().await;
            let ok = |uid: &str, etag: &str| {
                ResponseTemplate::new(200)
                    .insert_header("ETag", etag)
                    .set_body_string(event(uid))
            };
            // Found under the re-escaped name.
            mount_get(&server, "/cal/alice/odd@x.ics", ok("odd@x", "\"5\"")).await;
            // Only found under the name as listed.
            mount_get(&server, "/cal/alice/b@y.ics", ResponseTemplate::new(404)).await;
            mount_get(&server, "/cal/alice/b%40y.ics", ok("b@y", "\"6\"")).await;
            mount_get(&server, "/cal/alice/gone.ics", ResponseTemplate::new(404)).await;
            mount_get(&server, "/cal/alice/broken.ics", ResponseTemplate::new(500)).await;
            Mock::given(method("REPORT"))
                .respond_with(ResponseTemplate::new(207))
                .expect(0)
                .mount(&server)
                .await;

            let session = icloud_session(&server);
            let mut refs = vec![
                listed("/cal/alice/odd%40x.ics"),
                listed("/cal/alice/b%40y.ics"),
                listed("/cal/alice/gone.ics"),
                listed("/cal/alice/broken.ics"),
            ];
            let outcome = fetch_bodies(&session, &mut refs, &Cancellable::new())
                .await
                .unwrap();

            let uids: Vec<_> = refs.iter().map(|r| r.uid.as_str()).collect();
            assert_eq!(uids, ["odd@x", "b@y"]);
            assert_eq!(refs[0].locator, Some(Href::from("/cal/alice/odd@x.ics")));
            assert_eq!(refs[0].revision.as_str(), "5");
            assert_eq!(refs[1].locator, Some(Href::from("/cal/alice/b%40y.ics")));
            assert_eq!(refs[1].revision.as_str(), "6");

            assert_eq!(outcome.removed.len(), 1);
            assert_eq!(outcome.removed[0].locator, Some(Href::from("/cal/alice/gone.ics")));
            assert_eq!(outcome.failed.len(), 1);
            assert_eq!(outcome.failed[0].locator, Some(Href::from("/cal/alice/broken.ics")));
            assert!(!outcome.cancelled);
        }

        #[tokio::test]
        async fn stops_between_objects_when_cancelled() {
            let server = MockServer::start().await;
            let cancel = Cancellable::new();
            let trigger = cancel.clone();
            Mock::given(method("GET"))
                .and(path("/cal/alice/a.ics"))
                .respond_with(move |_: &wiremock::Request| {
                    trigger.cancel();
                    ResponseTemplate::new(200)
                        .insert_header("ETag", "\"1\"")
                        .set_body_string(event("a"))
                })
                .expect(1)
                .mount(&server)
                .await;
            mount_get(&server, "/cal/alice/b.ics", ResponseTemplate::new(500)).await;

            let session = icloud_session(&server);
            let mut refs = vec![listed("/cal/alice/a.ics"), listed("/cal/alice/b.ics")];
            let outcome = fetch_bodies(&session, &mut refs, &cancel).await.unwrap();

            assert!(outcome.cancelled);
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0].uid, "a");
            assert!(outcome.failed.is_empty());
        }
    }
}
