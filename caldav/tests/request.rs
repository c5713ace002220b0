// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request building tests.

use pimdav_caldav::{
    CalendarMultiGetRequest, CalendarQueryRequest, ComponentKind, FreeBusyQueryRequest,
    PrincipalPropertySearchRequest, Prop, PropFindRequest, QueryData,
};

#[test]
fn request_propfind_builds_xml() {
    let mut request = PropFindRequest::new();
    request.add_property(Prop::DisplayName);
    request.add_property(Prop::GetETag);
    request.add_property(Prop::ResourceType);

    let xml = request.build().expect("Failed to build PROPFIND XML");

    assert!(xml.contains("<D:propfind"));
    assert!(xml.contains("xmlns:D=\"DAV:\""));
    assert!(xml.contains("<D:prop>"));
    assert!(xml.contains("<D:displayname/>"));
    assert!(xml.contains("<D:getetag/>"));
    assert!(xml.contains("<D:resourcetype/>"));
    assert!(xml.contains("</D:prop>"));
    assert!(xml.contains("</D:propfind>"));
    assert!(!xml.contains("xmlns:C="));
    assert!(!xml.contains("xmlns:CS="));
}

#[test]
fn request_propfind_declares_only_used_namespaces() {
    let xml = PropFindRequest::new()
        .add_property(Prop::GetCTag)
        .add_property(Prop::CurrentUserPrivilegeSet)
        .build()
        .expect("Failed to build PROPFIND XML");

    assert!(xml.contains("xmlns:CS=\"http://calendarserver.org/ns/\""));
    assert!(xml.contains("<CS:getctag/>"));
    assert!(xml.contains("<D:current-user-privilege-set/>"));
    assert!(!xml.contains("xmlns:C="));

    let xml = PropFindRequest::new()
        .add_property(Prop::ScheduleOutboxUrl)
        .build()
        .expect("Failed to build PROPFIND XML");
    assert!(xml.contains("xmlns:C=\"urn:ietf:params:xml:ns:caldav\""));
    assert!(xml.contains("<C:schedule-outbox-URL/>"));
}

#[test]
fn request_calendar_query_builds_xml() {
    let request = CalendarQueryRequest::new(ComponentKind::Event).time_range(
        "20250101T000000Z".to_string(),
        Some("20250131T235959Z".to_string()),
    );

    let xml = request.build().expect("Failed to build calendar-query XML");

    assert!(xml.contains("<C:calendar-query"));
    assert!(xml.contains("<D:prop>"));
    assert!(xml.contains("<D:getetag/>"));
    assert!(!xml.contains("<C:calendar-data"));
    assert!(xml.contains("<C:filter>"));
    assert!(xml.contains("<C:comp-filter name=\"VCALENDAR\">"));
    assert!(xml.contains("<C:comp-filter name=\"VEVENT\">"));
    assert!(xml.contains("<C:time-range"));
    assert!(xml.contains("start=\"20250101T000000Z\""));
    assert!(xml.contains("end=\"20250131T235959Z\""));
}

#[test]
fn request_calendar_query_without_range_matches_whole_kind() {
    let xml = CalendarQueryRequest::new(ComponentKind::Todo)
        .build()
        .expect("Failed to build calendar-query XML");

    assert!(xml.contains("<C:comp-filter name=\"VCALENDAR\">"));
    assert!(xml.contains("<C:comp-filter name=\"VTODO\"/>"));
    assert!(!xml.contains("<C:time-range"));
}

#[test]
fn request_calendar_query_open_ended_range() {
    let xml = CalendarQueryRequest::new(ComponentKind::Event)
        .time_range("20250101T000000Z".to_string(), None)
        .build()
        .expect("Failed to build calendar-query XML");

    assert!(xml.contains("start=\"20250101T000000Z\""));
    assert!(!xml.contains("end="));
}

#[test]
fn request_calendar_query_for_uids() {
    let xml = CalendarQueryRequest::new(ComponentKind::Journal)
        .data(QueryData::Uid)
        .build()
        .expect("Failed to build calendar-query XML");

    assert!(xml.contains("<C:calendar-data>"));
    assert!(xml.contains("<C:comp name=\"VCALENDAR\">"));
    assert!(xml.contains("<C:comp name=\"VJOURNAL\">"));
    assert!(xml.contains("<C:prop name=\"UID\"/>"));
    assert!(xml.contains("<C:comp-filter name=\"VJOURNAL\"/>"));
}

#[test]
fn request_calendar_multiget_builds_xml() {
    let mut request = CalendarMultiGetRequest::new();
    assert!(request.is_empty());
    request
        .add_href("/calendars/user/event1.ics".to_string())
        .add_href("/calendars/user/event2.ics".to_string());
    assert_eq!(request.len(), 2);

    let xml = request.build().expect("Failed to build multiget XML");

    assert!(xml.contains("<C:calendar-multiget"));
    assert!(xml.contains("<D:getetag/>"));
    assert!(xml.contains("<C:calendar-data/>"));
    assert!(xml.contains("<D:href>/calendars/user/event1.ics</D:href>"));
    assert!(xml.contains("<D:href>/calendars/user/event2.ics</D:href>"));
    assert!(xml.contains("</C:calendar-multiget>"));
}

#[test]
fn request_calendar_multiget_escapes_hrefs() {
    let mut request = CalendarMultiGetRequest::new();
    request.add_href("/cal/a&b.ics".to_string());
    let xml = request.build().expect("Failed to build multiget XML");
    assert!(xml.contains("<D:href>/cal/a&amp;b.ics</D:href>"));
}

#[test]
fn request_free_busy_query_builds_xml() {
    let xml = FreeBusyQueryRequest::new(
        "20250602T080000Z".to_string(),
        "20250602T180000Z".to_string(),
    )
    .build()
    .expect("Failed to build free-busy-query XML");

    assert!(xml.contains("<C:free-busy-query"));
    assert!(xml.contains("<C:time-range start=\"20250602T080000Z\" end=\"20250602T180000Z\"/>"));
}

#[test]
fn request_principal_property_search_builds_xml() {
    let xml = PrincipalPropertySearchRequest::new("mailto:bob@example.org".to_string())
        .build()
        .expect("Failed to build principal-property-search XML");

    assert!(xml.contains("<D:principal-property-search"));
    assert!(xml.contains("<D:apply-to-principal-collection-set/>"));
    assert!(xml.contains("<C:calendar-user-address-set/>"));
    assert!(xml.contains("<D:match>mailto:bob@example.org</D:match>"));
    assert!(xml.contains("<D:displayname/>"));
}
