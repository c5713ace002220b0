// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::ops::Deref;

/// Calendar resource href (path).
///
/// A `Href` represents the address of a calendar resource on a `CalDAV` server,
/// such as `/calendars/user/event1.ics`. Servers may answer with absolute URLs or
/// with differently escaped paths, so compare two hrefs with [`Href::same_resource`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Href(String);

impl Href {
    /// Creates a new `Href` from a string.
    #[must_use]
    pub const fn new(href: String) -> Self {
        Self(href)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the path component, dropping scheme and authority of absolute URLs.
    #[must_use]
    pub fn path(&self) -> &str {
        let s = self.0.as_str();
        for scheme in ["https://", "http://"] {
            if let Some(rest) = s.strip_prefix(scheme) {
                return rest.find('/').map_or("/", |i| &rest[i..]);
            }
        }
        s
    }

    /// Returns the path with percent-escapes decoded.
    #[must_use]
    pub fn decoded_path(&self) -> String {
        let path = self.path();
        urlencoding::decode(path).map_or_else(|_| path.to_string(), |p| p.into_owned())
    }

    /// Returns true when both hrefs address the same resource.
    #[must_use]
    pub fn same_resource(&self, other: &Href) -> bool {
        self.0 == other.0 || self.decoded_path() == other.decoded_path()
    }

    /// Returns true when the href addresses a collection rather than an object.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.0.ends_with('/')
    }
}

impl Deref for Href {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Href {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Href {
    fn from(href: String) -> Self {
        Self(href)
    }
}

impl From<&str> for Href {
    fn from(href: &str) -> Self {
        Self(href.to_string())
    }
}

/// Entity tag for change detection.
///
/// An `ETag` is the server's opaque revision of one object. It is compared as an
/// uninterpreted token; surrounding double quotes of a strong tag are dropped on
/// construction so values from headers, multistatus bodies and the cache agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Creates a new `ETag` from a string, de-quoting a strong tag.
    #[must_use]
    pub fn new(etag: String) -> Self {
        let trimmed = etag.trim();
        match trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
        {
            Some(inner) => Self(inner.to_string()),
            None if trimmed.len() == etag.len() => Self(etag),
            None => Self(trimmed.to_string()),
        }
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for a weak validator (`W/"..."`).
    #[must_use]
    pub fn is_weak(&self) -> bool {
        self.0.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("W/"))
    }

    /// Returns the value suitable for an `If-Match` header.
    #[must_use]
    pub fn header_value(&self) -> String {
        if self.is_weak() {
            self.0.clone()
        } else {
            format!("\"{}\"", self.0)
        }
    }
}

impl Deref for ETag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ETag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ETag {
    fn from(etag: String) -> Self {
        Self::new(etag)
    }
}

impl From<&str> for ETag {
    fn from(etag: &str) -> Self {
        Self::new(etag.to_string())
    }
}

/// Opaque per-collection change tag (`CS:getctag`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SyncToken(String);

impl SyncToken {
    /// Creates a new `SyncToken`.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SyncToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Component kind served by one backend instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// `VEVENT` objects.
    #[default]
    Event,
    /// `VTODO` objects.
    Todo,
    /// `VJOURNAL` objects.
    Journal,
}

impl ComponentKind {
    /// Returns the iCalendar component name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "VEVENT",
            Self::Todo => "VTODO",
            Self::Journal => "VJOURNAL",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote calendar object as seen by a single refresh or fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReference {
    /// UID of the object; empty until a body has been retrieved for listing entries.
    pub uid: String,
    /// Server revision.
    pub revision: ETag,
    /// Server-assigned address, absent until first stored.
    pub locator: Option<Href>,
    /// Full body, tagged with its revision, once fetched.
    pub object: Option<String>,
}

impl ObjectReference {
    /// Creates a reference for a listing entry without a body.
    #[must_use]
    pub fn listed(locator: Href, revision: ETag) -> Self {
        Self {
            uid: String::new(),
            revision,
            locator: Some(locator),
            object: None,
        }
    }
}

/// Caller-selected policy for a conflicting write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Surface a precondition failure as out-of-sync.
    #[default]
    Fail,
    /// Keep whichever copy is newer; the server decides through the precondition.
    UseNewer,
    /// Keep the server copy; a precondition failure is a successful no-op.
    KeepServer,
    /// Overwrite the server copy unconditionally.
    KeepLocal,
    /// Write the local copy as a new revision when the prior revision still matches.
    WriteCopy,
}

/// Local state of a cached object, owned by the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfflineState {
    /// Matches the server.
    #[default]
    Synced,
    /// Created locally, never stored on the server.
    LocallyCreated,
    /// Modified locally, not yet pushed.
    LocallyModified,
    /// Deleted locally, not yet pushed.
    LocallyDeleted,
}

/// Classification produced by one diff pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClassification {
    /// Present remotely only.
    Created,
    /// Present on both sides with different revisions.
    Modified,
    /// Present locally only, on an unbounded pass.
    Removed,
    /// Present on both sides with the same revision.
    Unchanged,
}

/// Scheduling support derived at connect time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulingCapability {
    /// The server advertises `calendar-schedule`.
    pub scheduling: bool,
    /// The server advertises `calendar-auto-schedule`.
    pub auto_scheduling: bool,
}

/// Known server families that need a workaround.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerQuirks {
    /// Nothing special.
    #[default]
    None,
    /// Google Calendar: e-mail inferable from the username, error requests count against a quota.
    Google,
    /// iCloud: bulk retrieval is unreliable.
    ICloud,
}

impl ServerQuirks {
    /// Detects quirks from the host of the collection URL.
    #[must_use]
    pub fn detect(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
        if ["google.com", "googleapis.com", "googleusercontent.com"]
            .iter()
            .any(|d| matches(d))
        {
            Self::Google
        } else if matches("icloud.com") {
            Self::ICloud
        } else {
            Self::None
        }
    }

    /// Whether the account e-mail can be derived from the username.
    #[must_use]
    pub const fn infers_email(self) -> bool {
        matches!(self, Self::Google)
    }

    /// Whether bulk retrieval must be replaced by one-at-a-time GETs.
    #[must_use]
    pub const fn avoids_multiget(self) -> bool {
        matches!(self, Self::ICloud)
    }

    /// Whether failed lookups are costly enough to skip locator fallbacks.
    #[must_use]
    pub const fn limits_lookups(self) -> bool {
        matches!(self, Self::Google)
    }
}

/// Outcome of capability discovery, valid for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The current user may write to the collection.
    pub writable: bool,
    /// Scheduling support for the backend's component kind.
    pub scheduling: SchedulingCapability,
    /// Server workarounds in effect.
    pub quirks: ServerQuirks,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_strips_quotes_of_strong_tags() {
        assert_eq!(ETag::from("\"abc\"").as_str(), "abc");
        assert_eq!(ETag::from("abc").as_str(), "abc");
        assert_eq!(ETag::from("\"abc\""), ETag::from("abc"));
        assert_eq!(ETag::from("abc").header_value(), "\"abc\"");
    }

    #[test]
    fn etag_keeps_weak_tags() {
        let etag = ETag::from("W/\"abc\"");
        assert!(etag.is_weak());
        assert_eq!(etag.as_str(), "W/\"abc\"");
        assert_eq!(etag.header_value(), "W/\"abc\"");
        assert!(!ETag::from("\"abc\"").is_weak());
    }

    #[test]
    fn href_compares_decoded_paths() {
        let a = Href::from("/cal/user/a%40b.ics");
        let b = Href::from("https://dav.example.com/cal/user/a@b.ics");
        assert!(a.same_resource(&b));
        assert!(!a.same_resource(&Href::from("/cal/user/other.ics")));
    }

    #[test]
    fn href_path_of_bare_host() {
        assert_eq!(Href::from("https://dav.example.com").path(), "/");
        assert_eq!(Href::from("/x/").path(), "/x/");
        assert!(Href::from("/x/").is_collection());
    }

    #[test]
    fn quirks_from_host() {
        assert_eq!(
            ServerQuirks::detect("apidata.googleusercontent.com"),
            ServerQuirks::Google
        );
        assert_eq!(ServerQuirks::detect("www.google.com"), ServerQuirks::Google);
        assert_eq!(
            ServerQuirks::detect("p42-caldav.icloud.com"),
            ServerQuirks::ICloud
        );
        assert_eq!(
            ServerQuirks::detect("notgoogle.com.example.org"),
            ServerQuirks::None
        );
        assert_eq!(ServerQuirks::detect("localhost"), ServerQuirks::None);
    }
}
