// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request builders for `CalDAV` operations.

use quick_xml::events::BytesStart;

use crate::error::CalDavError;
use crate::types::ComponentKind;
use crate::xml::{XmlWriter, ns};

/// PROPFIND request builder.
#[derive(Debug)]
pub struct PropFindRequest {
    props: Vec<Prop>,
}

/// Properties to request in PROPFIND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prop {
    /// Display name.
    DisplayName,
    /// Resource type.
    ResourceType,
    /// `ETag`.
    GetETag,
    /// Collection change tag.
    GetCTag,
    /// Privileges of the current user.
    CurrentUserPrivilegeSet,
    /// Principal owning the collection.
    Owner,
    /// Scheduling outbox of a principal.
    ScheduleOutboxUrl,
    /// Calendar user addresses of a principal.
    CalendarUserAddressSet,
}

impl Prop {
    const fn name(self) -> &'static str {
        match self {
            Self::DisplayName => "displayname",
            Self::ResourceType => "resourcetype",
            Self::GetETag => "getetag",
            Self::GetCTag => "getctag",
            Self::CurrentUserPrivilegeSet => "current-user-privilege-set",
            Self::Owner => "owner",
            Self::ScheduleOutboxUrl => "schedule-outbox-URL",
            Self::CalendarUserAddressSet => "calendar-user-address-set",
        }
    }

    const fn prefix(self) -> &'static str {
        match self {
            Self::DisplayName
            | Self::ResourceType
            | Self::GetETag
            | Self::CurrentUserPrivilegeSet
            | Self::Owner => "D",
            Self::GetCTag => "CS",
            Self::ScheduleOutboxUrl | Self::CalendarUserAddressSet => "C",
        }
    }

    fn qualified(self) -> String {
        format!("{}:{}", self.prefix(), self.name())
    }
}

impl PropFindRequest {
    /// Creates a new PROPFIND request.
    #[must_use]
    pub fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Adds a property to the request.
    pub fn add_property(&mut self, prop: Prop) -> &mut Self {
        self.props.push(prop);
        self
    }

    /// Builds the XML body for the PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut w = XmlWriter::new();

        // <D:propfind xmlns:D="DAV:">
        let mut propfind = BytesStart::new("D:propfind");
        propfind.push_attribute(("xmlns:D", ns::DAV));
        if self.props.iter().any(|p| p.prefix() == "C") {
            propfind.push_attribute(("xmlns:C", ns::CALDAV));
        }
        if self.props.iter().any(|p| p.prefix() == "CS") {
            propfind.push_attribute(("xmlns:CS", ns::CALENDARSERVER));
        }
        w.start(propfind)?;

        // <D:prop>
        w.start(BytesStart::new("D:prop"))?;
        for prop in &self.props {
            w.empty(BytesStart::new(prop.qualified()))?;
        }
        w.end("D:prop")?;

        w.end("D:propfind")?;
        w.finish()
    }
}

impl Default for PropFindRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// What a calendar query returns per matching object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryData {
    /// Only the `ETag`.
    #[default]
    ETagOnly,
    /// The `ETag` and calendar data reduced to the UID property.
    Uid,
}

/// Time range filter for calendar queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    /// Start, as UTC date-time (`YYYYMMDDTHHMMSSZ`).
    pub start: String,
    /// End, as UTC date-time.
    pub end: Option<String>,
}

/// Calendar query request builder.
#[derive(Debug)]
pub struct CalendarQueryRequest {
    component: ComponentKind,
    data: QueryData,
    time_range: Option<TimeRange>,
}

impl CalendarQueryRequest {
    /// Creates a query matching every object of a component kind.
    #[must_use]
    pub const fn new(component: ComponentKind) -> Self {
        Self {
            component,
            data: QueryData::ETagOnly,
            time_range: None,
        }
    }

    /// Selects what is returned per object.
    #[must_use]
    pub const fn data(mut self, data: QueryData) -> Self {
        self.data = data;
        self
    }

    /// Sets the time range filter.
    #[must_use]
    pub fn time_range(mut self, start: String, end: Option<String>) -> Self {
        self.time_range = Some(TimeRange { start, end });
        self
    }

    /// Builds the XML body for the calendar query request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut w = XmlWriter::new();
        let kind = self.component.as_str();

        // <C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
        let mut calendar_query = BytesStart::new("C:calendar-query");
        calendar_query.push_attribute(("xmlns:D", ns::DAV));
        calendar_query.push_attribute(("xmlns:C", ns::CALDAV));
        w.start(calendar_query)?;

        // <D:prop>
        w.start(BytesStart::new("D:prop"))?;
        w.empty(BytesStart::new("D:getetag"))?;
        if self.data == QueryData::Uid {
            // <C:calendar-data><C:comp name="VCALENDAR"><C:comp name="VEVENT"><C:prop name="UID"/>
            w.start(BytesStart::new("C:calendar-data"))?;
            w.start(BytesStart::new("C:comp").with_attributes([("name", "VCALENDAR")]))?;
            w.start(BytesStart::new("C:comp").with_attributes([("name", kind)]))?;
            w.empty(BytesStart::new("C:prop").with_attributes([("name", "UID")]))?;
            w.end("C:comp")?;
            w.end("C:comp")?;
            w.end("C:calendar-data")?;
        }
        w.end("D:prop")?;

        // <C:filter><C:comp-filter name="VCALENDAR"><C:comp-filter name="VEVENT">
        w.start(BytesStart::new("C:filter"))?;
        w.start(BytesStart::new("C:comp-filter").with_attributes([("name", "VCALENDAR")]))?;
        let inner = BytesStart::new("C:comp-filter").with_attributes([("name", kind)]);
        match &self.time_range {
            Some(tr) => {
                w.start(inner)?;
                let mut time_range = BytesStart::new("C:time-range");
                time_range.push_attribute(("start", tr.start.as_str()));
                if let Some(end) = &tr.end {
                    time_range.push_attribute(("end", end.as_str()));
                }
                w.empty(time_range)?;
                w.end("C:comp-filter")?;
            }
            None => w.empty(inner)?,
        }
        w.end("C:comp-filter")?;
        w.end("C:filter")?;

        w.end("C:calendar-query")?;
        w.finish()
    }
}

/// Calendar multiget request builder.
#[derive(Debug)]
pub struct CalendarMultiGetRequest {
    hrefs: Vec<String>,
}

impl CalendarMultiGetRequest {
    /// Creates a new calendar multiget request.
    #[must_use]
    pub fn new() -> Self {
        Self { hrefs: Vec::new() }
    }

    /// Adds an href to the request.
    pub fn add_href(&mut self, href: String) -> &mut Self {
        self.hrefs.push(href);
        self
    }

    /// Number of hrefs added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hrefs.len()
    }

    /// Returns true if no href was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hrefs.is_empty()
    }

    /// Builds the XML body for the calendar multiget request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut w = XmlWriter::new();

        // <C:calendar-multiget xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
        let mut multiget = BytesStart::new("C:calendar-multiget");
        multiget.push_attribute(("xmlns:D", ns::DAV));
        multiget.push_attribute(("xmlns:C", ns::CALDAV));
        w.start(multiget)?;

        // <D:prop>
        w.start(BytesStart::new("D:prop"))?;
        w.empty(BytesStart::new("D:getetag"))?;
        w.empty(BytesStart::new("C:calendar-data"))?;
        w.end("D:prop")?;

        for href in &self.hrefs {
            w.text_element("D:href", href)?;
        }

        w.end("C:calendar-multiget")?;
        w.finish()
    }
}

impl Default for CalendarMultiGetRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Free/busy query request builder.
#[derive(Debug)]
pub struct FreeBusyQueryRequest {
    start: String,
    end: String,
}

impl FreeBusyQueryRequest {
    /// Creates a new free/busy query request.
    #[must_use]
    pub const fn new(start: String, end: String) -> Self {
        Self { start, end }
    }

    /// Builds the XML body for the free/busy query request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut w = XmlWriter::new();

        // <C:free-busy-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
        let mut free_busy = BytesStart::new("C:free-busy-query");
        free_busy.push_attribute(("xmlns:D", ns::DAV));
        free_busy.push_attribute(("xmlns:C", ns::CALDAV));
        w.start(free_busy)?;

        // <C:time-range start="..." end="..."/>
        let mut time_range = BytesStart::new("C:time-range");
        time_range.push_attribute(("start", self.start.as_str()));
        time_range.push_attribute(("end", self.end.as_str()));
        w.empty(time_range)?;

        w.end("C:free-busy-query")?;
        w.finish()
    }
}

/// `DAV:principal-property-search` by calendar user address.
#[derive(Debug)]
pub struct PrincipalPropertySearchRequest {
    address: String,
}

impl PrincipalPropertySearchRequest {
    /// Searches principals whose calendar user address set contains `address`.
    #[must_use]
    pub const fn new(address: String) -> Self {
        Self { address }
    }

    /// Builds the XML body for the search.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut w = XmlWriter::new();

        let mut search = BytesStart::new("D:principal-property-search");
        search.push_attribute(("xmlns:D", ns::DAV));
        search.push_attribute(("xmlns:C", ns::CALDAV));
        w.start(search)?;
        w.empty(BytesStart::new("D:apply-to-principal-collection-set"))?;

        // <D:property-search>
        w.start(BytesStart::new("D:property-search"))?;
        w.start(BytesStart::new("D:prop"))?;
        w.empty(BytesStart::new("C:calendar-user-address-set"))?;
        w.end("D:prop")?;
        w.text_element("D:match", &self.address)?;
        w.end("D:property-search")?;

        // <D:prop><D:displayname/></D:prop>
        w.start(BytesStart::new("D:prop"))?;
        w.empty(BytesStart::new("D:displayname"))?;
        w.end("D:prop")?;

        w.end("D:principal-property-search")?;
        w.finish()
    }
}
