// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Server capability discovery.

use crate::cancel::Cancellable;
use crate::config::CalDavConfig;
use crate::error::CalDavError;
use crate::http::{Depth, HttpClient, OptionsResponse};
use crate::request::{Prop, PropFindRequest};
use crate::types::{
    Capabilities, ComponentKind, SchedulingCapability, ServerQuirks, SyncToken,
};

const WRITE_PRIVILEGES: [&str; 3] = ["write", "write-content", "all"];
const WRITE_METHODS: [&str; 3] = ["PUT", "POST", "DELETE"];

/// Discovers what the collection supports.
///
/// # Errors
///
/// Fails with `NotACalendar` when the server does not advertise `calendar-access`,
/// and with the normalized authentication errors when access is refused.
pub(crate) async fn probe(
    http: &HttpClient,
    config: &CalDavConfig,
    cancel: &Cancellable,
) -> Result<Capabilities, CalDavError> {
    let collection = config.collection_path();

    cancel.check()?;
    let options = http.options(&collection).await?;
    cancel.check()?;
    if !options.has_capability("calendar-access") {
        return Err(CalDavError::NotACalendar(http.full_url(&collection)));
    }

    let writable = match current_user_privileges(http, &collection).await {
        Ok(Some(privileges)) => privileges
            .iter()
            .any(|p| WRITE_PRIVILEGES.contains(&p.as_str())),
        Ok(None) => allows_writes(&options),
        Err(e) => {
            tracing::debug!(error = %e, "privilege query failed, inspecting Allow instead");
            allows_writes(&options)
        }
    };
    cancel.check()?;

    let scheduling = scheduling_capability(&options, config.component);

    // Some servers answer OPTIONS without credentials; the change tag is
    // optional, so only an authentication failure counts here.
    match fetch_ctag(http, &collection).await {
        Err(e) if e.is_authentication() => return Err(e),
        Err(e) => tracing::debug!(error = %e, "change tag probe failed"),
        Ok(_) => {}
    }
    cancel.check()?;

    let quirks = http
        .host()
        .map_or(ServerQuirks::None, |host| ServerQuirks::detect(&host));

    Ok(Capabilities {
        writable,
        scheduling,
        quirks,
    })
}

fn allows_writes(options: &OptionsResponse) -> bool {
    WRITE_METHODS.iter().any(|m| options.allows(m))
}

/// Journals are never scheduled.
fn scheduling_capability(options: &OptionsResponse, kind: ComponentKind) -> SchedulingCapability {
    if kind == ComponentKind::Journal {
        return SchedulingCapability::default();
    }
    let auto_scheduling = options.has_capability("calendar-auto-schedule");
    SchedulingCapability {
        scheduling: auto_scheduling || options.has_capability("calendar-schedule"),
        auto_scheduling,
    }
}

async fn current_user_privileges(
    http: &HttpClient,
    collection: &str,
) -> Result<Option<Vec<String>>, CalDavError> {
    let body = PropFindRequest::new()
        .add_property(Prop::CurrentUserPrivilegeSet)
        .build()?;
    let multistatus = http.propfind(collection, Depth::Zero, body).await?;
    Ok(multistatus
        .first_ok_props()
        .and_then(|p| p.privileges.clone()))
}

/// Reads the collection change tag.
///
/// # Errors
///
/// Returns `ServerNonConformant` when the server answers without a tag.
pub(crate) async fn fetch_ctag(
    http: &HttpClient,
    collection: &str,
) -> Result<SyncToken, CalDavError> {
    let body = PropFindRequest::new().add_property(Prop::GetCTag).build()?;
    let multistatus = http.propfind(collection, Depth::Zero, body).await?;
    multistatus
        .first_ok_props()
        .and_then(|p| p.get_ctag.clone())
        .filter(|tag| !tag.is_empty())
        .map(SyncToken::new)
        .ok_or_else(|| CalDavError::ServerNonConformant("no getctag".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dav: &[&str]) -> OptionsResponse {
        OptionsResponse {
            dav: dav.iter().map(|s| (*s).to_string()).collect(),
            allow: Vec::new(),
        }
    }

    #[test]
    fn journals_are_never_scheduled() {
        let opts = options(&["1", "calendar-access", "calendar-auto-schedule"]);
        assert_eq!(
            scheduling_capability(&opts, ComponentKind::Journal),
            SchedulingCapability::default()
        );
        let caps = scheduling_capability(&opts, ComponentKind::Event);
        assert!(caps.scheduling && caps.auto_scheduling);
    }

    #[test]
    fn plain_scheduling() {
        let opts = options(&["calendar-access", "calendar-schedule"]);
        let caps = scheduling_capability(&opts, ComponentKind::Todo);
        assert!(caps.scheduling);
        assert!(!caps.auto_scheduling);
    }

    #[test]
    fn allow_header_grants_write() {
        let mut opts = options(&[]);
        assert!(!allows_writes(&opts));
        opts.allow = vec!["GET".into(), "DELETE".into()];
        assert!(allows_writes(&opts));
    }
}
