use crate::error::ParseError;
use crate::models::{PageFragment, PageRecord};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Text,
}

struct Capture {
    field: Field,
    depth: usize,
    value: String,
}

/// Parses one page fragment into its title and body text.
///
/// The first `<title>` and the first `<text>` anywhere below the page win;
/// later ones (older revisions, for instance) are ignored. A missing element
/// leaves the corresponding field empty.
pub fn parse_page(fragment: &PageFragment) -> Result<PageRecord, ParseError> {
    let mut reader = Reader::from_reader(fragment.as_bytes());
    let mut buf = Vec::new();
    let mut title: Option<String> = None;
    let mut text: Option<String> = None;
    let mut capture: Option<Capture> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf);
        match event.map_err(|source| ParseError::Xml {
            position: reader.buffer_position(),
            source,
        })? {
            Event::Start(start) => {
                depth += 1;
                if capture.is_none() {
                    let wanted =
                        wanted_field(start.name().as_ref(), title.is_some(), text.is_some());
                    capture = wanted.map(|field| Capture {
                        field,
                        depth,
                        value: String::new(),
                    });
                }
            }
            Event::Empty(start) => {
                if capture.is_none() {
                    match wanted_field(start.name().as_ref(), title.is_some(), text.is_some()) {
                        Some(Field::Title) => title = Some(String::new()),
                        Some(Field::Text) => text = Some(String::new()),
                        None => {}
                    }
                }
            }
            Event::Text(t) => {
                if let Some(capture) = capture.as_mut() {
                    let unescaped = t.unescape().map_err(|source| ParseError::Xml {
                        position: reader.buffer_position(),
                        source,
                    })?;
                    capture.value.push_str(&unescaped);
                }
            }
            Event::CData(cdata) => {
                if let Some(capture) = capture.as_mut() {
                    let bytes = cdata.into_inner();
                    capture.value.push_str(std::str::from_utf8(&bytes)?);
                }
            }
            Event::End(_) => {
                if capture.as_ref().is_some_and(|c| c.depth == depth) {
                    if let Some(done) = capture.take() {
                        match done.field {
                            Field::Title => title = Some(done.value),
                            Field::Text => text = Some(done.value),
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(PageRecord {
        title: title.unwrap_or_default(),
        text: text.unwrap_or_default(),
    })
}

fn wanted_field(name: &[u8], have_title: bool, have_text: bool) -> Option<Field> {
    match name {
        b"title" if !have_title => Some(Field::Title),
        b"text" if !have_text => Some(Field::Text),
        _ => None,
    }
}
