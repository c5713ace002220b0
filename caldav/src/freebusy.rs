// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Free/busy lookup through the scheduling outbox, with a per-principal fallback.

use jiff::Timestamp;

use crate::cancel::Cancellable;
use crate::error::CalDavError;
use crate::http::Depth;
use crate::ical::{self, Component, ContentLine};
use crate::request::{FreeBusyQueryRequest, PrincipalPropertySearchRequest, Prop, PropFindRequest};
use crate::response::parse_schedule_response;
use crate::session::Session;
use crate::types::Href;

const ICAL_UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const ICAL_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

/// Returns one `VFREEBUSY` text per answer found for `users`.
///
/// # Errors
///
/// Only cancellation and authentication failures are returned; every other
/// failure leaves the affected user out of the result.
pub(crate) async fn free_busy(
    session: &Session,
    users: &[String],
    start: Timestamp,
    end: Timestamp,
    cancel: &Cancellable,
) -> Result<Vec<String>, CalDavError> {
    cancel.check()?;

    if session.capabilities.scheduling.scheduling {
        match from_outbox(session, users, start, end).await {
            Ok(found) if !found.is_empty() => return Ok(found),
            Ok(_) => tracing::debug!("outbox returned no free/busy data"),
            Err(e) if e.is_authentication() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "outbox free/busy failed"),
        }
    }

    let mut found = Vec::new();
    for user in users {
        cancel.check()?;
        match from_principal(session, user, start, end).await {
            Ok(busy) => found.extend(busy),
            Err(e) if e.is_authentication() => return Err(e),
            Err(e) => tracing::warn!(%user, error = %e, "free/busy lookup failed"),
        }
    }
    Ok(found)
}

/// The scheduling outbox of the collection owner, discovered once per connection.
async fn schedule_outbox(session: &Session) -> Result<Option<Href>, CalDavError> {
    session
        .schedule_outbox
        .get_or_try_init(|| discover_outbox(session))
        .await
        .cloned()
}

async fn discover_outbox(session: &Session) -> Result<Option<Href>, CalDavError> {
    let body = PropFindRequest::new().add_property(Prop::Owner).build()?;
    let multistatus = session
        .http
        .propfind(&session.collection, Depth::Zero, body)
        .await?;
    let Some(owner) = multistatus.first_ok_props().and_then(|p| p.owner.clone()) else {
        tracing::debug!("collection reports no owner");
        return Ok(None);
    };

    let body = PropFindRequest::new()
        .add_property(Prop::ScheduleOutboxUrl)
        .build()?;
    let multistatus = session.http.propfind(&owner, Depth::Zero, body).await?;
    let outbox = multistatus
        .first_ok_props()
        .and_then(|p| p.schedule_outbox_url.clone());
    tracing::debug!(%owner, ?outbox, "schedule outbox discovered");
    Ok(outbox)
}

async fn from_outbox(
    session: &Session,
    users: &[String],
    start: Timestamp,
    end: Timestamp,
) -> Result<Vec<String>, CalDavError> {
    let Some(outbox) = schedule_outbox(session).await? else {
        return Ok(Vec::new());
    };

    let organizer = session
        .user_email()
        .or_else(|| session.config.auth.username().map(str::to_string));
    let request = freebusy_request(organizer.as_deref(), users, start, end, Timestamp::now());
    let answer = session
        .http
        .post(&outbox, ICAL_CONTENT_TYPE, request.to_string())
        .await?;

    Ok(parse_schedule_response(&answer)?
        .into_iter()
        .filter_map(|item| item.calendar_data)
        .flat_map(|data| ical::extract_components(&data, "VFREEBUSY"))
        .map(|c| c.to_string())
        .collect())
}

async fn from_principal(
    session: &Session,
    user: &str,
    start: Timestamp,
    end: Timestamp,
) -> Result<Vec<String>, CalDavError> {
    let search = PrincipalPropertySearchRequest::new(user.to_string()).build()?;
    let principals = session
        .http
        .report(&session.collection, Depth::Zero, search)
        .await?;
    let [principal] = principals.responses.as_slice() else {
        return Err(CalDavError::NotFound(format!(
            "{} principals match {user}",
            principals.responses.len()
        )));
    };
    if principal.href.is_empty() {
        return Err(CalDavError::NotFound(format!("no principal matches {user}")));
    }

    let query = FreeBusyQueryRequest::new(utc(start), utc(end)).build()?;
    let (content_type, body) = session
        .http
        .report_raw(&principal.href, Depth::Infinity, query)
        .await?;
    let is_calendar = content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case("text/calendar"));
    if !is_calendar {
        return Err(CalDavError::ServerNonConformant(format!(
            "free-busy-query answered with {content_type:?}"
        )));
    }

    Ok(ical::extract_components(&body, "VFREEBUSY")
        .into_iter()
        .map(|mut busy| {
            if !busy.has_property("ATTENDEE") {
                busy.properties
                    .push(ContentLine::new("ATTENDEE", format!("mailto:{user}")));
            }
            busy.to_string()
        })
        .collect())
}

fn freebusy_request(
    organizer: Option<&str>,
    users: &[String],
    start: Timestamp,
    end: Timestamp,
    now: Timestamp,
) -> Component {
    let mut busy = Component::new("VFREEBUSY");
    busy.set_property("UID", &uuid::Uuid::new_v4().to_string());
    busy.set_property("DTSTAMP", &utc(now));
    busy.set_property("DTSTART", &utc(start));
    busy.set_property("DTEND", &utc(end));
    if let Some(organizer) = organizer {
        busy.set_property("ORGANIZER", &format!("mailto:{organizer}"));
    }
    for user in users {
        let mut attendee = ContentLine::new("ATTENDEE", format!("mailto:{user}"));
        attendee.set_param("CUTYPE", "INDIVIDUAL");
        attendee.set_param("PARTSTAT", "NEEDS-ACTION");
        attendee.set_param("ROLE", "CHAIR");
        busy.properties.push(attendee);
    }

    let mut cal = Component::calendar();
    cal.set_property("METHOD", "REQUEST");
    cal.children.push(busy);
    cal
}

fn utc(t: Timestamp) -> String {
    t.strftime(ICAL_UTC_FORMAT).to_string()
}
