//! Shared quick-xml helpers used by the splitter and every family-specific
//! record parser (BioProject, BioSample, JGA).

use std::io::BufRead;
use std::str::FromStr;

use quick_xml::events::{BytesEnd, BytesStart};
use quick_xml::name::QName;
use quick_xml::Reader;

use crate::errors::{Error, ParseError, XmlError};

pub fn name_eq(name: QName, target: &str) -> bool {
    name.as_ref() == target.as_bytes()
}

pub fn start_eq(event: &BytesStart, name: &str) -> bool {
    name_eq(event.name(), name)
}

pub fn end_eq(event: &BytesEnd, name: &str) -> bool {
    name_eq(event.name(), name)
}

pub fn parse_attribute<R>(reader: &Reader<R>, event: &BytesStart, name: &str) -> Result<String, Error> {
    match event.try_get_attribute(name).map_err(XmlError::from)? {
        Some(value) => {
            let value = value.decode_and_unescape_value(reader.decoder()).map_err(|e| XmlError::Reader(e))?;
            Ok(value.trim().to_string())
        }
        None => Err(Error::Parsing(ParseError::NotFound(name.to_string()))),
    }
}

pub fn parse_attribute_opt<R>(reader: &Reader<R>, event: &BytesStart, name: &str) -> Result<Option<String>, Error> {
    match event.try_get_attribute(name).map_err(XmlError::from)? {
        Some(value) => {
            let value = value.decode_and_unescape_value(reader.decoder()).map_err(|e| XmlError::Reader(e))?;
            Ok(Some(value.trim().to_string()))
        }
        None => Ok(None),
    }
}

pub fn parse_attribute_string<R, T: FromStr>(reader: &Reader<R>, event: &BytesStart, name: &str) -> Result<T, Error> {
    let value = parse_attribute(reader, event, name)?;
    str::parse::<T>(&value).map_err(|_| Error::Parsing(ParseError::InvalidValue(value)))
}

pub fn unwrap_element<T>(element: Option<T>, name: &str) -> Result<T, Error> {
    match element {
        Some(inner) => Ok(inner),
        None => Err(Error::Parsing(ParseError::NotFound(name.to_string()))),
    }
}

/// Reads and discards everything up to and including the matching end tag for
/// `name`, tolerating nested elements of the same name.
pub fn skip_element<R: BufRead>(reader: &mut Reader<R>, name: &str) -> Result<(), Error> {
    use quick_xml::events::Event;

    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        match reader.read_event_into(&mut buf).map_err(XmlError::from)? {
            Event::Start(e) if name_eq(e.name(), name) => depth += 1,
            Event::End(e) if name_eq(e.name(), name) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => return Err(Error::Split(crate::errors::SplitError::UnmatchedEndTag(name.to_string()))),
            _ => {}
        }
        buf.clear();
    }
}

/// Reads the text content of the current element up to its matching end tag.
pub fn read_text<R: BufRead>(reader: &mut Reader<R>, name: &str) -> Result<String, Error> {
    use quick_xml::events::Event;

    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(XmlError::from)? {
            Event::Text(e) => text.push_str(&e.unescape().map_err(XmlError::from)?),
            Event::End(e) if name_eq(e.name(), name) => return Ok(text.trim().to_string()),
            Event::Eof => return Err(Error::Split(crate::errors::SplitError::UnmatchedEndTag(name.to_string()))),
            _ => {}
        }
        buf.clear();
    }
}
