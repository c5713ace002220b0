// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! XML utilities for WebDAV/CalDAV processing.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::CalDavError;

/// XML namespaces used in `CalDAV`.
pub mod ns {
    /// `WebDAV` namespace.
    pub const DAV: &str = "DAV:";

    /// `CalDAV` namespace.
    pub const CALDAV: &str = "urn:ietf:params:xml:ns:caldav";

    /// Calendar Server extensions namespace (`getctag`).
    pub const CALENDARSERVER: &str = "http://calendarserver.org/ns/";
}

/// Indenting XML writer over an in-memory buffer.
pub(crate) struct XmlWriter {
    inner: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    pub fn start(&mut self, elem: BytesStart<'_>) -> Result<(), CalDavError> {
        self.inner.write_event(Event::Start(elem))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<(), CalDavError> {
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn empty(&mut self, elem: BytesStart<'_>) -> Result<(), CalDavError> {
        self.inner.write_event(Event::Empty(elem))?;
        Ok(())
    }

    /// Writes `<name>text</name>`.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<(), CalDavError> {
        self.inner.write_event(Event::Start(BytesStart::new(name)))?;
        self.inner.write_event(Event::Text(BytesText::new(text)))?;
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn finish(self) -> Result<String, CalDavError> {
        let bytes = self.inner.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| CalDavError::Xml(format!("UTF-8 error: {e}")))
    }
}

/// Reads the text content of the element whose start tag was just consumed,
/// including the text of nested elements, up to its matching end tag.
///
/// # Errors
///
/// Returns an error if XML parsing fails or the document ends early.
pub(crate) fn read_text(
    reader: &mut quick_xml::Reader<&[u8]>,
    buf: &mut Vec<u8>,
) -> Result<String, CalDavError> {
    let mut text = String::new();
    let mut depth = 1;
    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::Eof => return Err(CalDavError::Xml("Unexpected EOF".to_string())),
            _ => {}
        }
    }
    Ok(text)
}

/// Returns true if an error body is a DAV `need-privileges` precondition.
pub(crate) fn is_need_privileges(body: &str) -> bool {
    let mut reader = quick_xml::Reader::from_str(body);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e) | Event::Empty(ref e))
                if e.name().local_name().into_inner() == b"need-privileges" =>
            {
                return true;
            }
            Ok(Event::Eof) | Err(_) => return false,
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_need_privileges() {
        let body = r#"<?xml version="1.0"?>
<D:error xmlns:D="DAV:"><D:need-privileges><D:resource>
<D:href>/c/</D:href><D:privilege><D:write/></D:privilege>
</D:resource></D:need-privileges></D:error>"#;
        assert!(is_need_privileges(body));
        assert!(!is_need_privileges("<D:error xmlns:D=\"DAV:\"/>"));
        assert!(!is_need_privileges("Forbidden"));
    }

    #[test]
    fn reads_nested_text() {
        let mut reader = quick_xml::Reader::from_str("<a>x &amp; <b>y</b></a>");
        let mut buf = Vec::new();
        let _ = reader.read_event_into(&mut buf).unwrap();
        assert_eq!(read_text(&mut reader, &mut buf).unwrap(), "x & y");
    }
}
