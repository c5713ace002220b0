// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! iCalendar glue on top of the `icalendar` parser.
//!
//! Calendar objects are otherwise opaque. Parsed text is turned into a small
//! owned tree so the engine can read UIDs, keep the revision marker, toggle the
//! scheduling agent and merge instances of one UID.

use std::fmt;

use icalendar::parser::{self, read_calendar, unfold};

use crate::error::CalDavError;
use crate::types::ETag;

/// Property carrying the server revision inside a cached object.
pub const REVISION_MARKER: &str = "X-PIMDAV-CALDAV-ETAG";

const INSTANCE_KINDS: [&str; 3] = ["VEVENT", "VTODO", "VJOURNAL"];
const FOLD_WIDTH: usize = 75;

/// One property parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name, upper-cased.
    pub name: String,
    /// Value without surrounding quotes.
    pub value: String,
}

/// One unfolded content line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    /// Property name, upper-cased.
    pub name: String,
    /// Parameters in source order.
    pub params: Vec<Param>,
    /// Raw value.
    pub value: String,
}

impl ContentLine {
    /// Creates a property without parameters.
    #[must_use]
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    fn from_parsed(prop: &parser::Property<'_>) -> Self {
        let params = prop
            .params
            .iter()
            .map(|p| Param {
                name: p.key.to_string().to_ascii_uppercase(),
                value: p
                    .val
                    .as_ref()
                    .map(|v| v.to_string().trim_matches('"').to_string())
                    .unwrap_or_default(),
            })
            .collect();
        Self {
            name: prop.name.to_string().to_ascii_uppercase(),
            params,
            value: prop.val.to_string(),
        }
    }

    /// Returns the value of a parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_str())
    }

    /// Sets a parameter, replacing any existing one of the same name.
    pub fn set_param(&mut self, name: &str, value: &str) {
        self.remove_param(name);
        self.params.push(Param {
            name: name.to_ascii_uppercase(),
            value: value.to_string(),
        });
    }

    /// Removes every parameter of the given name.
    pub fn remove_param(&mut self, name: &str) {
        self.params.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }
}

impl fmt::Display for ContentLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = self.name.clone();
        for p in &self.params {
            line.push(';');
            line.push_str(&p.name);
            line.push('=');
            if p.value.contains([':', ';', ',']) {
                line.push('"');
                line.push_str(&p.value);
                line.push('"');
            } else {
                line.push_str(&p.value);
            }
        }
        line.push(':');
        line.push_str(&self.value);
        write_folded(f, &line)
    }
}

/// A component (`BEGIN:X` .. `END:X`) with its properties and sub-components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Component name, upper-cased.
    pub name: String,
    /// Properties in source order.
    pub properties: Vec<ContentLine>,
    /// Nested components.
    pub children: Vec<Component>,
}

impl Component {
    /// Creates an empty component.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates an empty `VCALENDAR` with version and product id.
    #[must_use]
    pub fn calendar() -> Self {
        let mut cal = Self::new("VCALENDAR");
        cal.properties.push(ContentLine::new("VERSION", "2.0"));
        cal.properties.push(ContentLine::new(
            "PRODID",
            concat!("-//pimdav//pimdav-caldav ", env!("CARGO_PKG_VERSION"), "//EN"),
        ));
        cal
    }

    fn from_parsed(comp: &parser::Component<'_>) -> Self {
        Self {
            name: comp.name.to_string().to_ascii_uppercase(),
            properties: comp.properties.iter().map(ContentLine::from_parsed).collect(),
            children: comp.components.iter().map(Self::from_parsed).collect(),
        }
    }

    /// Parses the first top-level component of a text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidObject` if the text contains no well-formed component.
    pub fn parse(text: &str) -> Result<Self, CalDavError> {
        Self::parse_all(text)?
            .into_iter()
            .next()
            .ok_or_else(|| CalDavError::InvalidObject("no iCalendar component".to_string()))
    }

    /// Parses every top-level component of a text.
    ///
    /// A text starting with `BEGIN:VCALENDAR` yields that calendar; bare
    /// components (a lone `VEVENT`, a `VFREEBUSY`) are returned as they are.
    ///
    /// # Errors
    ///
    /// Returns `InvalidObject` if the parser rejects the text.
    pub fn parse_all(text: &str) -> Result<Vec<Self>, CalDavError> {
        let unfolded = unfold(text.trim_start());
        let wrapped = is_calendar_text(&unfolded);
        let source = if wrapped {
            unfolded
        } else {
            format!("BEGIN:VCALENDAR\r\n{}\r\nEND:VCALENDAR\r\n", unfolded.trim_end())
        };

        let calendar = read_calendar(&source)
            .map_err(|e| CalDavError::InvalidObject(format!("unparsable iCalendar: {e}")))?;
        let children: Vec<Self> = calendar.components.iter().map(Self::from_parsed).collect();
        if !wrapped {
            return Ok(children);
        }
        Ok(vec![Self {
            name: "VCALENDAR".to_string(),
            properties: calendar.properties.iter().map(ContentLine::from_parsed).collect(),
            children,
        }])
    }

    /// Returns the first property of the given name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&ContentLine> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns true if the component carries the property.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Sets a single-valued property, replacing existing occurrences.
    pub fn set_property(&mut self, name: &str, value: &str) {
        self.remove_property(name);
        self.properties.push(ContentLine::new(name, value));
    }

    /// Removes every property of the given name.
    pub fn remove_property(&mut self, name: &str) {
        self.properties
            .retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    /// Iterates over `VEVENT`/`VTODO`/`VJOURNAL` components at this level or below a `VCALENDAR`.
    pub fn instances(&self) -> impl Iterator<Item = &Self> {
        let own = is_instance(&self.name).then_some(self);
        own.into_iter()
            .chain(self.children.iter().filter(|c| is_instance(&c.name)))
    }

    fn instances_mut(&mut self) -> Vec<&mut Self> {
        if is_instance(&self.name) {
            vec![self]
        } else {
            self.children
                .iter_mut()
                .filter(|c| is_instance(&c.name))
                .collect()
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BEGIN:{}\r\n", self.name)?;
        for p in &self.properties {
            write!(f, "{p}")?;
        }
        for c in &self.children {
            write!(f, "{c}")?;
        }
        write!(f, "END:{}\r\n", self.name)
    }
}

fn is_instance(name: &str) -> bool {
    INSTANCE_KINDS.iter().any(|k| name.eq_ignore_ascii_case(k))
}

fn is_calendar_text(unfolded: &str) -> bool {
    unfolded
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .is_some_and(|l| l.eq_ignore_ascii_case("BEGIN:VCALENDAR"))
}

fn write_folded(f: &mut fmt::Formatter<'_>, line: &str) -> fmt::Result {
    let mut rest = line;
    let mut width = FOLD_WIDTH;
    while rest.len() > width {
        let mut cut = width;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        f.write_str(&rest[..cut])?;
        f.write_str("\r\n ")?;
        rest = &rest[cut..];
        width = FOLD_WIDTH - 1;
    }
    f.write_str(rest)?;
    f.write_str("\r\n")
}

/// Returns the UID of the first instance in a calendar object.
#[must_use]
pub fn object_uid(comp: &Component) -> Option<String> {
    comp.instances()
        .find_map(|c| c.property("UID"))
        .map(|p| p.value.trim().to_string())
        .filter(|uid| !uid.is_empty())
}

/// Writes the revision marker on the object and on each of its instances.
pub fn set_revision_marker(comp: &mut Component, revision: &ETag) {
    if !is_instance(&comp.name) {
        comp.set_property(REVISION_MARKER, revision.as_str());
    }
    for inst in comp.instances_mut() {
        inst.set_property(REVISION_MARKER, revision.as_str());
    }
}

/// Removes the revision marker everywhere it may have been written.
pub fn remove_revision_marker(comp: &mut Component) {
    comp.remove_property(REVISION_MARKER);
    for inst in comp.instances_mut() {
        inst.remove_property(REVISION_MARKER);
    }
}

/// Reads the revision stored in a cached object body.
///
/// The marker on the object itself wins over the one on its first instance.
#[must_use]
pub fn revision_of(object: &str) -> Option<ETag> {
    let comp = Component::parse(object).ok()?;
    comp.property(REVISION_MARKER)
        .or_else(|| comp.instances().find_map(|c| c.property(REVISION_MARKER)))
        .map(|p| ETag::new(p.value.clone()))
}

/// Parses a retrieved body, tags it with its revision and returns `(uid, text)`.
///
/// # Errors
///
/// Returns `InvalidObject` if the body does not parse.
pub fn tag_with_revision(body: &str, revision: &ETag) -> Result<(Option<String>, String), CalDavError> {
    let mut comp = Component::parse(body)?;
    set_revision_marker(&mut comp, revision);
    Ok((object_uid(&comp), comp.to_string()))
}

/// Marks every organizer and attendee of every instance as client-scheduled.
///
/// Returns true if anything was tagged.
pub fn set_schedule_agent_client(comp: &mut Component) -> bool {
    let mut tagged = false;
    for inst in comp.instances_mut() {
        for prop in &mut inst.properties {
            if prop.name == "ORGANIZER" || prop.name == "ATTENDEE" {
                prop.set_param("SCHEDULE-AGENT", "CLIENT");
                tagged = true;
            }
        }
    }
    tagged
}

/// Removes the scheduling-agent parameter from organizers and attendees.
pub fn remove_schedule_agent(comp: &mut Component) {
    for inst in comp.instances_mut() {
        for prop in &mut inst.properties {
            if prop.name == "ORGANIZER" || prop.name == "ATTENDEE" {
                prop.remove_param("SCHEDULE-AGENT");
            }
        }
    }
}

/// Merges the master and recurrence overrides of one UID into a single `VCALENDAR`.
///
/// Each input may be a full `VCALENDAR` or a bare instance. Time zones are kept
/// once per `TZID`; calendar-level properties come from the first `VCALENDAR` input.
///
/// # Errors
///
/// Returns `InvalidObject` if an input does not parse or no instance is found.
pub fn merge_instances<S: AsRef<str>>(instances: &[S]) -> Result<Component, CalDavError> {
    let mut merged: Option<Component> = None;
    let mut timezones: Vec<Component> = Vec::new();
    let mut others: Vec<Component> = Vec::new();
    let mut items: Vec<Component> = Vec::new();

    for text in instances {
        for root in Component::parse_all(text.as_ref())? {
            if root.name == "VCALENDAR" {
                let Component {
                    name,
                    properties,
                    children,
                } = root;
                if merged.is_none() {
                    merged = Some(Component {
                        name,
                        properties,
                        children: Vec::new(),
                    });
                }
                for child in children {
                    if child.name == "VTIMEZONE" {
                        push_timezone(&mut timezones, child);
                    } else if is_instance(&child.name) {
                        items.push(child);
                    } else {
                        others.push(child);
                    }
                }
            } else if root.name == "VTIMEZONE" {
                push_timezone(&mut timezones, root);
            } else if is_instance(&root.name) {
                items.push(root);
            }
        }
    }

    if items.is_empty() {
        return Err(CalDavError::InvalidObject(
            "no calendar instance to store".to_string(),
        ));
    }

    let mut cal = merged.unwrap_or_else(Component::calendar);
    cal.children.extend(timezones);
    cal.children.extend(others);
    cal.children.extend(items);
    Ok(cal)
}

fn push_timezone(zones: &mut Vec<Component>, tz: Component) {
    let tzid = tz.property("TZID").map(|p| p.value.clone());
    let seen = tzid.is_some()
        && zones
            .iter()
            .any(|z| z.property("TZID").map(|p| &p.value) == tzid.as_ref());
    if !seen {
        zones.push(tz);
    }
}

/// Returns every component of the given name found anywhere in a text.
#[must_use]
pub fn extract_components(text: &str, name: &str) -> Vec<Component> {
    fn walk(comp: Component, name: &str, out: &mut Vec<Component>) {
        if comp.name.eq_ignore_ascii_case(name) {
            out.push(comp);
        } else {
            for child in comp.children {
                walk(child, name, out);
            }
        }
    }

    let mut out = Vec::new();
    for root in Component::parse_all(text).unwrap_or_default() {
        walk(root, name, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Test//EN\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:Europe/Berlin\r\n\
END:VTIMEZONE\r\n\
BEGIN:VEVENT\r\n\
UID:meeting-1\r\n\
SUMMARY:Planning\r\n\
ORGANIZER;CN=\"Boss: Jane\":mailto:jane@example.com\r\n\
ATTENDEE;PARTSTAT=NEEDS-ACTION:mailto:joe@example.com\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn parses_uid_and_quoted_params() {
        let comp = Component::parse(EVENT).unwrap();
        assert_eq!(object_uid(&comp).as_deref(), Some("meeting-1"));
        let event = comp.instances().next().unwrap();
        let organizer = event.property("ORGANIZER").unwrap();
        assert_eq!(organizer.param("CN"), Some("Boss: Jane"));
        assert_eq!(organizer.value, "mailto:jane@example.com");
    }

    #[test]
    fn unfolds_continuation_lines() {
        let text = "BEGIN:VTODO\nUID:a\nDESCRIPTION:first\n  second\nEND:VTODO\n";
        let comp = Component::parse(text).unwrap();
        assert_eq!(comp.property("DESCRIPTION").unwrap().value, "first second");
        assert_eq!(object_uid(&comp).as_deref(), Some("a"));
    }

    #[test]
    fn folds_long_lines() {
        let mut comp = Component::new("VEVENT");
        comp.set_property("DESCRIPTION", &"ä".repeat(60));
        let text = comp.to_string();
        for line in text.split("\r\n") {
            assert!(line.len() <= FOLD_WIDTH, "{line}");
        }
        let back = Component::parse(&text).unwrap();
        assert_eq!(back.property("DESCRIPTION").unwrap().value, "ä".repeat(60));
    }

    #[test]
    fn revision_marker_roundtrip() {
        let (uid, tagged) = tag_with_revision(EVENT, &ETag::from("\"7\"")).unwrap();
        assert_eq!(uid.as_deref(), Some("meeting-1"));
        assert_eq!(revision_of(&tagged), Some(ETag::from("7")));

        let mut comp = Component::parse(&tagged).unwrap();
        remove_revision_marker(&mut comp);
        assert!(!comp.to_string().contains(REVISION_MARKER));
        assert_eq!(revision_of(&comp.to_string()), None);
    }

    #[test]
    fn schedule_agent_is_toggled() {
        let mut comp = Component::parse(EVENT).unwrap();
        assert!(set_schedule_agent_client(&mut comp));
        let text = comp.to_string();
        assert!(text.contains("ORGANIZER;CN=\"Boss: Jane\";SCHEDULE-AGENT=CLIENT:"));
        assert!(text.contains("ATTENDEE;PARTSTAT=NEEDS-ACTION;SCHEDULE-AGENT=CLIENT:"));

        remove_schedule_agent(&mut comp);
        assert!(!comp.to_string().contains("SCHEDULE-AGENT"));
    }

    #[test]
    fn merges_master_and_override() {
        let override_ = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTIMEZONE\r\nTZID:Europe/Berlin\r\n\
END:VTIMEZONE\r\nBEGIN:VEVENT\r\nUID:meeting-1\r\nRECURRENCE-ID:20250101T100000Z\r\n\
END:VEVENT\r\nEND:VCALENDAR\r\n";
        let merged = merge_instances(&[EVENT, override_]).unwrap();
        assert_eq!(merged.property("PRODID").unwrap().value, "-//Test//EN");
        let zones = merged
            .children
            .iter()
            .filter(|c| c.name == "VTIMEZONE")
            .count();
        assert_eq!(zones, 1);
        assert_eq!(merged.instances().count(), 2);
    }

    #[test]
    fn merges_bare_instances() {
        let merged = merge_instances(&["BEGIN:VTODO\r\nUID:t\r\nEND:VTODO\r\n"]).unwrap();
        assert_eq!(merged.name, "VCALENDAR");
        assert!(merged.has_property("VERSION"));
        assert_eq!(object_uid(&merged).as_deref(), Some("t"));
    }

    #[test]
    fn rejects_calendar_without_instances() {
        assert!(merge_instances(&["BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n"]).is_err());
        assert_eq!(revision_of("not a calendar"), None);
    }

    #[test]
    fn extracts_nested_components() {
        let text = "BEGIN:VCALENDAR\r\nBEGIN:VFREEBUSY\r\nUID:f\r\nEND:VFREEBUSY\r\nEND:VCALENDAR\r\n";
        let found = extract_components(text, "VFREEBUSY");
        assert_eq!(found.len(), 1);
        assert!(found[0].has_property("UID"));
    }
}
