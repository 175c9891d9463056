//! XMLTV program guide reading and writing.
//!
//! Only the parts a tuner lineup needs are kept: channel ids, display names
//! and icons, and for each programme its channel, start/stop stamps, title
//! and description.
//!
//! ```text
//! <tv>
//!   <channel id="news.uk">
//!     <display-name>News HD</display-name>
//!     <icon src="http://logo/news.png"/>
//!   </channel>
//!   <programme channel="news.uk" start="20240101120000 +0000" stop="20240101130000 +0000">
//!     <title>Midday News</title>
//!     <desc>Headlines.</desc>
//!   </programme>
//! </tv>
//! ```

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::ProtocolError;

const ROOT: &str = "tv";
const GENERATOR: &str = "iptv-hdhr";

/// A `<channel>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuideChannel {
    pub id: String,
    /// Every `<display-name>`, in document order.
    pub display_names: Vec<String>,
    /// `src` of the first `<icon>`.
    pub icon: Option<String>,
}

/// A `<programme>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuideProgramme {
    /// Id of the channel this programme airs on.
    pub channel: String,
    /// XMLTV timestamp, e.g. `20240101120000 +0000`.
    pub start: String,
    pub stop: String,
    /// First `<title>`.
    pub title: String,
    /// First `<desc>`, empty if absent.
    pub description: String,
}

/// A parsed XMLTV document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guide {
    pub channels: Vec<GuideChannel>,
    pub programmes: Vec<GuideProgramme>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    DisplayName,
    Title,
    Description,
}

impl Guide {
    /// Parse an XMLTV document.
    ///
    /// Unknown elements are skipped. Fails if the XML is malformed or the
    /// root element is not `<tv>`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);

        let mut guide = Guide::default();
        let mut buf = Vec::new();
        let mut seen_root = false;
        let mut depth = 0usize;
        let mut channel: Option<GuideChannel> = None;
        let mut programme: Option<GuideProgramme> = None;
        let mut field: Option<Field> = None;
        let mut text = String::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if !seen_root {
                        check_root(&name)?;
                        seen_root = true;
                    }
                    depth += 1;

                    match (depth, name.as_str()) {
                        (2, "channel") => channel = Some(read_channel(&e)?),
                        (2, "programme") => programme = Some(read_programme(&e)?),
                        (3, "display-name") if channel.is_some() => {
                            field = Some(Field::DisplayName);
                            text.clear();
                        }
                        (3, "title") if programme.is_some() => {
                            field = Some(Field::Title);
                            text.clear();
                        }
                        (3, "desc") if programme.is_some() => {
                            field = Some(Field::Description);
                            text.clear();
                        }
                        _ => {}
                    }
                }

                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if !seen_root {
                        check_root(&name)?;
                        seen_root = true;
                    } else {
                        match (depth, name.as_str()) {
                            (1, "channel") => guide.channels.push(read_channel(&e)?),
                            (1, "programme") => guide.programmes.push(read_programme(&e)?),
                            (2, "icon") => {
                                if let Some(ch) = channel.as_mut().filter(|ch| ch.icon.is_none()) {
                                    ch.icon = attribute(&e, "src")?.filter(|src| !src.is_empty());
                                }
                            }
                            _ => {}
                        }
                    }
                }

                Ok(Event::Text(e)) => {
                    if field.is_some() {
                        text.push_str(&e.unescape().map_err(xml_error)?);
                    }
                }

                Ok(Event::CData(e)) => {
                    if field.is_some() {
                        text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }

                Ok(Event::End(_)) => {
                    match depth {
                        3 => {
                            if let Some(field) = field.take() {
                                let value = text.trim().to_string();
                                store_field(field, value, channel.as_mut(), programme.as_mut());
                            }
                        }
                        2 => {
                            if let Some(ch) = channel.take() {
                                guide.channels.push(ch);
                            }
                            if let Some(p) = programme.take() {
                                guide.programmes.push(p);
                            }
                        }
                        _ => {}
                    }
                    depth = depth.saturating_sub(1);
                }

                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(e)),
                _ => {}
            }
            buf.clear();
        }

        if !seen_root {
            return Err(ProtocolError::NotAGuide("no root element".to_string()));
        }
        if depth > 0 {
            return Err(ProtocolError::Xml("document ends inside an element".to_string()));
        }

        Ok(guide)
    }

    /// Serialize as an XMLTV document.
    pub fn to_xml(&self) -> Result<String, ProtocolError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;

        let mut root = BytesStart::new(ROOT);
        root.push_attribute(("generator-info-name", GENERATOR));
        writer.write_event(Event::Start(root)).map_err(xml_error)?;

        for channel in &self.channels {
            let mut start = BytesStart::new("channel");
            start.push_attribute(("id", channel.id.as_str()));
            writer.write_event(Event::Start(start)).map_err(xml_error)?;
            for name in &channel.display_names {
                write_text_element(&mut writer, "display-name", name)?;
            }
            if let Some(icon) = &channel.icon {
                let mut element = BytesStart::new("icon");
                element.push_attribute(("src", icon.as_str()));
                writer.write_event(Event::Empty(element)).map_err(xml_error)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("channel")))
                .map_err(xml_error)?;
        }

        for programme in &self.programmes {
            let mut start = BytesStart::new("programme");
            start.push_attribute(("start", programme.start.as_str()));
            start.push_attribute(("stop", programme.stop.as_str()));
            start.push_attribute(("channel", programme.channel.as_str()));
            writer.write_event(Event::Start(start)).map_err(xml_error)?;
            write_text_element(&mut writer, "title", &programme.title)?;
            if !programme.description.is_empty() {
                write_text_element(&mut writer, "desc", &programme.description)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("programme")))
                .map_err(xml_error)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(ROOT)))
            .map_err(xml_error)?;

        String::from_utf8(writer.into_inner()).map_err(xml_error)
    }
}

fn check_root(name: &str) -> Result<(), ProtocolError> {
    if name == ROOT {
        Ok(())
    } else {
        Err(ProtocolError::NotAGuide(format!("root element is <{}>", name)))
    }
}

fn read_channel(e: &BytesStart<'_>) -> Result<GuideChannel, ProtocolError> {
    Ok(GuideChannel {
        id: attribute(e, "id")?.unwrap_or_default(),
        ..GuideChannel::default()
    })
}

fn read_programme(e: &BytesStart<'_>) -> Result<GuideProgramme, ProtocolError> {
    Ok(GuideProgramme {
        channel: attribute(e, "channel")?.unwrap_or_default(),
        start: attribute(e, "start")?.unwrap_or_default(),
        stop: attribute(e, "stop")?.unwrap_or_default(),
        ..GuideProgramme::default()
    })
}

fn store_field(
    field: Field,
    value: String,
    channel: Option<&mut GuideChannel>,
    programme: Option<&mut GuideProgramme>,
) {
    match (field, channel, programme) {
        (Field::DisplayName, Some(ch), _) if !value.is_empty() => ch.display_names.push(value),
        (Field::Title, _, Some(p)) if p.title.is_empty() => p.title = value,
        (Field::Description, _, Some(p)) if p.description.is_empty() => p.description = value,
        _ => {}
    }
}

/// Unescaped, trimmed attribute value.
fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, ProtocolError> {
    match e.try_get_attribute(name).map_err(xml_error)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(xml_error)?.trim().to_string())),
        None => Ok(None),
    }
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    text: &str,
) -> Result<(), ProtocolError> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(xml_error)?;
    Ok(())
}

fn xml_error<E: std::fmt::Display>(e: E) -> ProtocolError {
    ProtocolError::Xml(e.to_string())
}
