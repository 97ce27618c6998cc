//! Minimal SMIL 2.0 document model, enough to describe a playlist of archive chunks for
//! `unified_remix`.

use std::io::Write;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::chunk::timestamp;
use crate::error::{Error, Result};

pub const SMIL_NAMESPACE: &str = "http://www.w3.org/2001/SMIL20/Language";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Smil {
    pub head: Vec<Meta>,
    pub body: Seq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Seq(pub Vec<SeqItem>);

#[derive(Debug, Clone, PartialEq)]
pub enum SeqItem {
    Seq(Seq),
    Par(Par),
    Media(MediaItem),
}

/// Items played in parallel, optionally clipped to a wallclock range.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Par {
    pub items: Vec<SeqItem>,
    pub clip: Clip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"video" => Some(MediaKind::Video),
            b"audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub src: String,
    pub clip: Clip,
}

impl MediaItem {
    pub fn video(src: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            src: src.into(),
            clip: Clip::default(),
        }
    }

    pub fn audio(src: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Audio,
            src: src.into(),
            clip: Clip::default(),
        }
    }

    pub fn with_clip(mut self, begin: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.clip = Clip { begin, end };
        self
    }
}

/// `clipBegin` / `clipEnd`, written as `wallclock(...)` values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Clip {
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Clip {
    fn apply(&self, element: &mut BytesStart) {
        if let Some(begin) = &self.begin {
            let value = format!("wallclock({})", timestamp(begin));
            element.push_attribute(("clipBegin", value.as_str()));
        }
        if let Some(end) = &self.end {
            let value = format!("wallclock({})", timestamp(end));
            element.push_attribute(("clipEnd", value.as_str()));
        }
    }

    fn read(element: &BytesStart) -> Result<Self> {
        Ok(Self {
            begin: wallclock(element, b"clipBegin")?,
            end: wallclock(element, b"clipEnd")?,
        })
    }
}

impl Smil {
    /// A single `<seq>` of `<video>` items, played back to back.
    pub fn from_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = sources
            .into_iter()
            .map(|src| SeqItem::Media(MediaItem::video(src)))
            .collect();

        Self {
            head: Vec::new(),
            body: Seq(items),
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut smil = BytesStart::new("smil");
        smil.push_attribute(("xmlns", SMIL_NAMESPACE));
        writer.write_event(Event::Start(smil))?;

        if self.head.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new("head")))?;
        } else {
            writer.write_event(Event::Start(BytesStart::new("head")))?;
            for meta in &self.head {
                let mut element = BytesStart::new("meta");
                element.push_attribute(("name", meta.name.as_str()));
                element.push_attribute(("content", meta.content.as_str()));
                writer.write_event(Event::Empty(element))?;
            }
            writer.write_event(Event::End(BytesEnd::new("head")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("body")))?;
        write_seq(&mut writer, &self.body)?;
        writer.write_event(Event::End(BytesEnd::new("body")))?;

        writer.write_event(Event::End(BytesEnd::new("smil")))?;

        let mut xml = String::from_utf8_lossy(&buffer).into_owned();
        xml.push('\n');
        Ok(xml)
    }

    /// Reads a document written by [Smil::to_xml], or a hand-written one using the same
    /// elements. Unknown elements and attributes are skipped. When the body holds more than
    /// one top-level item, the first `<seq>` becomes the body and the rest are appended to it.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut head = Vec::new();
        let mut body = None;
        let mut open: Vec<Container> = Vec::new();
        let mut in_body = false;

        loop {
            let (element, empty) = match reader.read_event()? {
                Event::Start(element) => (element, false),
                Event::Empty(element) => (element, true),
                Event::End(element) => {
                    match element.local_name().as_ref() {
                        b"body" => in_body = false,
                        b"seq" | b"par" if in_body => {
                            if let Some(container) = open.pop() {
                                place(&mut open, &mut body, container.into_item());
                            }
                        }
                        _ => {}
                    }
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };

            let name = element.local_name();
            match name.as_ref() {
                b"body" => in_body = !empty,
                b"meta" if !in_body => head.push(Meta {
                    name: attribute(&element, b"name")?.unwrap_or_default(),
                    content: attribute(&element, b"content")?.unwrap_or_default(),
                }),
                b"seq" | b"par" if in_body => {
                    let container = if name.as_ref() == b"seq" {
                        Container::Seq(Seq::default())
                    } else {
                        Container::Par(Par {
                            items: Vec::new(),
                            clip: Clip::read(&element)?,
                        })
                    };
                    if empty {
                        place(&mut open, &mut body, container.into_item());
                    } else {
                        open.push(container);
                    }
                }
                tag if in_body => {
                    if let Some(kind) = MediaKind::from_tag(tag) {
                        let src = attribute(&element, b"src")?.ok_or_else(|| {
                            Error::InvalidSmil(format!("<{}> without src", kind.tag()))
                        })?;
                        let media = MediaItem {
                            kind,
                            src,
                            clip: Clip::read(&element)?,
                        };
                        place(&mut open, &mut body, SeqItem::Media(media));
                    }
                }
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(Error::InvalidSmil("unclosed <seq> or <par>".to_string()));
        }

        Ok(Self {
            head,
            body: body.unwrap_or_default(),
        })
    }
}

/// A `<seq>` or `<par>` whose end tag has not been read yet.
enum Container {
    Seq(Seq),
    Par(Par),
}

impl Container {
    fn push(&mut self, item: SeqItem) {
        match self {
            Container::Seq(seq) => seq.0.push(item),
            Container::Par(par) => par.items.push(item),
        }
    }

    fn into_item(self) -> SeqItem {
        match self {
            Container::Seq(seq) => SeqItem::Seq(seq),
            Container::Par(par) => SeqItem::Par(par),
        }
    }
}

fn place(open: &mut [Container], body: &mut Option<Seq>, item: SeqItem) {
    if let Some(parent) = open.last_mut() {
        parent.push(item);
        return;
    }

    match item {
        SeqItem::Seq(seq) if body.is_none() => *body = Some(seq),
        item => body.get_or_insert_with(Seq::default).0.push(item),
    }
}

fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }

    Ok(None)
}

/// A `clipBegin` / `clipEnd` value, with or without the `wallclock(...)` wrapper.
fn wallclock(element: &BytesStart, name: &[u8]) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = attribute(element, name)? else {
        return Ok(None);
    };
    let inner = value
        .strip_prefix("wallclock(")
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(&value);

    DateTime::parse_from_rfc3339(inner.trim())
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|e| {
            Error::InvalidSmil(format!(
                "{} {value:?} is not a timestamp: {e}",
                String::from_utf8_lossy(name)
            ))
        })
}

fn write_seq<W: Write>(writer: &mut Writer<W>, seq: &Seq) -> Result<()> {
    if seq.0.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("seq")))?;
        return Ok(());
    }

    writer.write_event(Event::Start(BytesStart::new("seq")))?;
    for item in &seq.0 {
        write_item(writer, item)?;
    }
    writer.write_event(Event::End(BytesEnd::new("seq")))?;
    Ok(())
}

fn write_item<W: Write>(writer: &mut Writer<W>, item: &SeqItem) -> Result<()> {
    match item {
        SeqItem::Seq(seq) => write_seq(writer, seq),
        SeqItem::Par(par) => {
            let mut element = BytesStart::new("par");
            par.clip.apply(&mut element);
            if par.items.is_empty() {
                writer.write_event(Event::Empty(element))?;
                return Ok(());
            }

            writer.write_event(Event::Start(element))?;
            for item in &par.items {
                write_item(writer, item)?;
            }
            writer.write_event(Event::End(BytesEnd::new("par")))?;
            Ok(())
        }
        SeqItem::Media(media) => {
            let mut element = BytesStart::new(media.kind.tag());
            element.push_attribute(("src", media.src.as_str()));
            media.clip.apply(&mut element);
            writer.write_event(Event::Empty(element))?;
            Ok(())
        }
    }
}
