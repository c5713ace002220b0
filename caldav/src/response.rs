// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsers for WebDAV/CalDAV operations.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::CalDavError;
use crate::types::{ETag, Href};
use crate::xml::read_text;

/// `WebDAV` multistatus response.
#[derive(Debug, Clone, Default)]
pub struct MultiStatusResponse {
    /// The response items.
    pub responses: Vec<ResponseItem>,
}

/// Individual response in multistatus.
#[derive(Debug, Clone, Default)]
pub struct ResponseItem {
    /// Address of the resource.
    pub href: Href,
    /// Property groups by status.
    pub prop_stats: Vec<PropStat>,
    /// Response-level status line, as used by multiget for missing resources.
    pub status: Option<String>,
}

/// Property stat with status and value.
#[derive(Debug, Clone, Default)]
pub struct PropStat {
    /// Properties reported with this status.
    pub props: Properties,
    /// Status line.
    pub status: String,
}

/// WebDAV/CalDAV properties.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// `D:displayname`.
    pub display_name: Option<String>,
    /// `D:getetag`.
    pub get_etag: Option<ETag>,
    /// `CS:getctag`.
    pub get_ctag: Option<String>,
    /// `C:calendar-data`.
    pub calendar_data: Option<String>,
    /// Privilege names of `D:current-user-privilege-set`, if reported.
    pub privileges: Option<Vec<String>>,
    /// `D:owner` href.
    pub owner: Option<Href>,
    /// `C:schedule-outbox-URL` href.
    pub schedule_outbox_url: Option<Href>,
    /// `C:calendar-user-address-set` hrefs.
    pub calendar_user_addresses: Vec<String>,
    /// `D:resourcetype` contains `C:calendar`.
    pub is_calendar: bool,
    /// `D:resourcetype` contains `D:collection`.
    pub is_collection: bool,
}

/// Extracts the numeric code of an HTTP status line.
fn status_code(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

impl PropStat {
    /// Returns the numeric status code.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        status_code(&self.status)
    }
}

impl ResponseItem {
    /// Returns the numeric response-level status code.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status.as_deref().and_then(status_code)
    }

    /// Returns the properties reported with status 200.
    #[must_use]
    pub fn ok_props(&self) -> Option<&Properties> {
        self.prop_stats
            .iter()
            .find(|p| p.status_code() == Some(200))
            .map(|p| &p.props)
    }

    /// Returns true if the server reported the resource as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
            || (self.ok_props().is_none()
                && !self.prop_stats.is_empty()
                && self.prop_stats.iter().all(|p| p.status_code() == Some(404)))
    }
}

impl MultiStatusResponse {
    /// Parses multistatus response from XML.
    ///
    /// # Errors
    ///
    /// Returns an error if XML parsing fails.
    pub fn from_xml(xml: &str) -> Result<Self, CalDavError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().check_end_names = true;

        let mut responses = Vec::new();
        let mut current: Option<ResponseItem> = None;
        let mut props = Properties::default();
        let mut propstat_status: Option<String> = None;
        let mut in_propstat = false;
        let mut in_prop = false;

        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,

                Event::Start(ref e) => {
                    let name = e.name().local_name().into_inner().to_vec();
                    match name.as_slice() {
                        b"response" => current = Some(ResponseItem::default()),
                        b"propstat" if current.is_some() => {
                            in_propstat = true;
                            props = Properties::default();
                            propstat_status = None;
                        }
                        b"prop" if in_propstat => in_prop = true,
                        b"href" if !in_propstat => {
                            let href = read_text(&mut reader, &mut buf)?;
                            if let Some(resp) = current.as_mut() {
                                resp.href = Href::new(href.trim().to_string());
                            }
                        }
                        b"status" if in_propstat && !in_prop => {
                            propstat_status = Some(read_text(&mut reader, &mut buf)?);
                        }
                        b"status" if !in_prop => {
                            let status = read_text(&mut reader, &mut buf)?;
                            if let Some(resp) = current.as_mut() {
                                resp.status = Some(status);
                            }
                        }
                        _ if in_prop => read_property(&mut reader, &mut buf, &name, &mut props)?,
                        _ => {}
                    }
                }

                Event::End(ref e) => match e.name().local_name().into_inner() {
                    b"response" => {
                        if let Some(resp) = current.take() {
                            responses.push(resp);
                        }
                    }
                    b"propstat" if in_propstat => {
                        in_propstat = false;
                        if let Some(resp) = current.as_mut() {
                            resp.prop_stats.push(PropStat {
                                props: std::mem::take(&mut props),
                                status: propstat_status.take().unwrap_or_default(),
                            });
                        }
                    }
                    b"prop" => in_prop = false,
                    _ => {}
                },

                _ => {}
            }
        }

        Ok(Self { responses })
    }

    /// Returns the first properties reported with status 200.
    #[must_use]
    pub fn first_ok_props(&self) -> Option<&Properties> {
        self.responses.iter().find_map(ResponseItem::ok_props)
    }
}

fn read_property(
    reader: &mut Reader<&[u8]>,
    buf: &mut Vec<u8>,
    name: &[u8],
    props: &mut Properties,
) -> Result<(), CalDavError> {
    match name {
        b"displayname" => props.display_name = Some(read_text(reader, buf)?),
        b"getetag" => {
            let etag = read_text(reader, buf)?;
            if !etag.trim().is_empty() {
                props.get_etag = Some(ETag::new(etag));
            }
        }
        b"getctag" => props.get_ctag = Some(read_text(reader, buf)?.trim().to_string()),
        b"calendar-data" => props.calendar_data = Some(read_text(reader, buf)?),
        b"resourcetype" => {
            for child in read_child_names(reader, buf)? {
                match child.as_str() {
                    "calendar" => props.is_calendar = true,
                    "collection" => props.is_collection = true,
                    _ => {}
                }
            }
        }
        b"current-user-privilege-set" => {
            let names = read_child_names(reader, buf)?;
            props.privileges = Some(names.into_iter().filter(|n| n != "privilege").collect());
        }
        b"owner" => props.owner = read_hrefs(reader, buf)?.into_iter().next().map(Href::new),
        b"schedule-outbox-URL" => {
            props.schedule_outbox_url = read_hrefs(reader, buf)?.into_iter().next().map(Href::new);
        }
        b"calendar-user-address-set" => props.calendar_user_addresses = read_hrefs(reader, buf)?,
        _ => {
            // Unknown property: skip its subtree.
            let _ = read_text(reader, buf)?;
        }
    }
    Ok(())
}

/// Collects the local names of every element nested in the current one.
fn read_child_names(
    reader: &mut Reader<&[u8]>,
    buf: &mut Vec<u8>,
) -> Result<Vec<String>, CalDavError> {
    let mut names = Vec::new();
    let mut depth = 1;
    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(ref e) => {
                depth += 1;
                names.push(String::from_utf8_lossy(e.name().local_name().into_inner()).into_owned());
            }
            Event::Empty(ref e) => {
                names.push(String::from_utf8_lossy(e.name().local_name().into_inner()).into_owned());
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(names);
                }
            }
            Event::Eof => return Err(CalDavError::Xml("Unexpected EOF".to_string())),
            _ => {}
        }
    }
}

/// Collects the text of every `href` nested in the current element.
fn read_hrefs(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<Vec<String>, CalDavError> {
    let mut hrefs = Vec::new();
    let mut depth = 1;
    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(ref e) if e.name().local_name().into_inner() == b"href" => {
                let href = read_text(reader, buf)?;
                let href = href.trim();
                if !href.is_empty() {
                    hrefs.push(href.to_string());
                }
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(hrefs);
                }
            }
            Event::Eof => return Err(CalDavError::Xml("Unexpected EOF".to_string())),
            _ => {}
        }
    }
}

/// One recipient entry of a `C:schedule-response`.
#[derive(Debug, Clone, Default)]
pub struct ScheduleResponseItem {
    /// Recipient address.
    pub recipient: Option<String>,
    /// iTIP request status.
    pub request_status: Option<String>,
    /// Returned calendar data.
    pub calendar_data: Option<String>,
}

/// Parses the answer of a POST to a scheduling outbox.
///
/// # Errors
///
/// Returns an error if XML parsing fails.
pub fn parse_schedule_response(xml: &str) -> Result<Vec<ScheduleResponseItem>, CalDavError> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();
    let mut current: Option<ScheduleResponseItem> = None;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(ref e) => match e.name().local_name().into_inner() {
                b"response" => current = Some(ScheduleResponseItem::default()),
                b"recipient" => {
                    let recipient = read_hrefs(&mut reader, &mut buf)?.into_iter().next();
                    if let Some(item) = current.as_mut() {
                        item.recipient = recipient;
                    }
                }
                b"request-status" => {
                    let status = read_text(&mut reader, &mut buf)?;
                    if let Some(item) = current.as_mut() {
                        item.request_status = Some(status.trim().to_string());
                    }
                }
                b"calendar-data" => {
                    let data = read_text(&mut reader, &mut buf)?;
                    if let Some(item) = current.as_mut() {
                        item.calendar_data = Some(data);
                    }
                }
                _ => {}
            },
            Event::End(ref e) if e.name().local_name().into_inner() == b"response" => {
                if let Some(item) = current.take() {
                    items.push(item);
                }
            }
            _ => {}
        }
    }

    Ok(items)
}
