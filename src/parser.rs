use crate::config::READ_BUFFER_BYTES;
use crate::error::ParseError;
use crate::models::PageFragment;
use bzip2::read::BzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use tracing::debug;

const PAGE_TAG: &[u8] = b"page";

/// Anything that can hand out page fragments one at a time, in document order.
pub trait PageSource {
    /// Returns `Ok(None)` once the document is exhausted.
    fn next_page(&mut self) -> Result<Option<PageFragment>, ParseError>;
}

/// Streams a dump and cuts it into one fragment per depth-1 `<page>` element.
///
/// Only the page currently being accumulated is held in memory; everything
/// outside page elements (siteinfo, whitespace) is read and dropped.
pub struct PageScanner<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    depth: usize,
    page: Option<Writer<Vec<u8>>>,
    pages_emitted: u64,
    finished: bool,
}

impl<R: BufRead> PageScanner<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::with_capacity(8 * 1024),
            depth: 0,
            page: None,
            pages_emitted: 0,
            finished: false,
        }
    }

    pub fn pages_emitted(&self) -> u64 {
        self.pages_emitted
    }

    /// Bytes of the partially accumulated page; zero between pages.
    pub fn pending_bytes(&self) -> usize {
        self.page.as_ref().map_or(0, |w| w.get_ref().len())
    }

    fn scan(&mut self) -> Result<Option<PageFragment>, ParseError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let emitted = {
                let event = self
                    .reader
                    .read_event_into(&mut self.buf)
                    .map_err(|source| ParseError::Xml {
                        position: self.reader.buffer_position(),
                        source,
                    })?;

                match &event {
                    Event::Start(start) => {
                        if self.page.is_none()
                            && self.depth == 1
                            && start.name().as_ref() == PAGE_TAG
                        {
                            self.page = Some(Writer::new(Vec::with_capacity(16 * 1024)));
                        }
                        self.depth += 1;
                        copy_event(self.page.as_mut(), &event, &self.reader)?;
                        None
                    }
                    Event::Empty(start)
                        if self.page.is_none()
                            && self.depth == 1
                            && start.name().as_ref() == PAGE_TAG =>
                    {
                        let mut writer = Writer::new(Vec::new());
                        copy_event(Some(&mut writer), &event, &self.reader)?;
                        Some(writer.into_inner())
                    }
                    Event::End(_) => {
                        copy_event(self.page.as_mut(), &event, &self.reader)?;
                        self.depth = self.depth.saturating_sub(1);
                        if self.depth == 1 {
                            self.page.take().map(Writer::into_inner)
                        } else {
                            None
                        }
                    }
                    Event::Eof => {
                        self.finished = true;
                        if self.page.take().is_some() {
                            return Err(ParseError::Truncated {
                                page: self.pages_emitted + 1,
                            });
                        }
                        debug!(pages = self.pages_emitted, "Reached end of dump");
                        return Ok(None);
                    }
                    _ => {
                        copy_event(self.page.as_mut(), &event, &self.reader)?;
                        None
                    }
                }
            };
            self.buf.clear();

            if let Some(bytes) = emitted {
                self.pages_emitted += 1;
                return Ok(Some(PageFragment::new(bytes)));
            }
        }
    }
}

fn copy_event<R>(
    writer: Option<&mut Writer<Vec<u8>>>,
    event: &Event<'_>,
    reader: &Reader<R>,
) -> Result<(), ParseError> {
    match writer {
        Some(writer) => writer
            .write_event(event)
            .map_err(|source| ParseError::Xml {
                position: reader.buffer_position(),
                source,
            }),
        None => Ok(()),
    }
}

impl<R: BufRead> PageSource for PageScanner<R> {
    fn next_page(&mut self) -> Result<Option<PageFragment>, ParseError> {
        let result = self.scan();
        if result.is_err() {
            self.finished = true;
        }
        result
    }
}

impl<R: BufRead> Iterator for PageScanner<R> {
    type Item = Result<PageFragment, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_page().transpose()
    }
}

/// Opens a dump from `path`, or from stdin when `path` is `None` or `-`.
/// Files ending in `.bz2` are decompressed on the fly.
pub fn open_dump(path: Option<&str>) -> io::Result<PageScanner<Box<dyn BufRead>>> {
    let source: Box<dyn BufRead> = match path {
        None | Some("-") => Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, io::stdin())),
        Some(path) => {
            let file = File::open(path)?;
            if path.ends_with(".bz2") {
                Box::new(BufReader::with_capacity(
                    READ_BUFFER_BYTES,
                    BzDecoder::new(file),
                ))
            } else {
                Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, file))
            }
        }
    };
    Ok(PageScanner::new(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(xml: &str) -> Vec<String> {
        PageScanner::new(xml.as_bytes())
            .map(|f| String::from_utf8(f.unwrap().as_bytes().to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn yields_one_fragment_per_page() {
        let xml = "<mediawiki><siteinfo><sitename>W</sitename></siteinfo>\
                   <page><title>A</title></page><page><title>B</title></page></mediawiki>";
        let pages = scan_all(xml);
        assert_eq!(
            pages,
            vec!["<page><title>A</title></page>", "<page><title>B</title></page>"]
        );
    }

    #[test]
    fn keeps_descendant_markup_verbatim() {
        let xml = r#"<mediawiki><page><title>A &amp; B</title><revision id="1"><text xml:space="preserve">x [[Y]] &lt;z&gt;</text></revision></page></mediawiki>"#;
        let pages = scan_all(xml);
        assert_eq!(
            pages[0],
            r#"<page><title>A &amp; B</title><revision id="1"><text xml:space="preserve">x [[Y]] &lt;z&gt;</text></revision></page>"#
        );
    }

    #[test]
    fn ignores_page_elements_below_depth_one() {
        let xml = "<mediawiki><archive><page><title>Nested</title></page></archive>\
                   <page><title>Top</title></page></mediawiki>";
        let pages = scan_all(xml);
        assert_eq!(pages, vec!["<page><title>Top</title></page>"]);
    }

    #[test]
    fn empty_page_element_is_a_fragment() {
        let pages = scan_all("<mediawiki><page/></mediawiki>");
        assert_eq!(pages, vec!["<page/>"]);
    }

    #[test]
    fn document_without_pages_yields_nothing() {
        assert!(scan_all("<mediawiki><siteinfo/></mediawiki>").is_empty());
        assert!(scan_all("").is_empty());
    }

    #[test]
    fn truncated_final_page_is_an_error() {
        let xml = "<mediawiki><page><title>A</title></page><page><title>B</title>";
        let mut scanner = PageScanner::new(xml.as_bytes());
        assert!(scanner.next_page().unwrap().is_some());
        // The reader may flag the unclosed element itself before we see Eof.
        let err = scanner.next_page().unwrap_err();
        assert!(matches!(
            err,
            ParseError::Truncated { page: 2 } | ParseError::Xml { .. }
        ));
        assert!(scanner.next_page().unwrap().is_none());
    }

    #[test]
    fn mismatched_end_tag_is_an_error() {
        let xml = "<mediawiki><page><title>A</text></page></mediawiki>";
        let mut scanner = PageScanner::new(xml.as_bytes());
        assert!(matches!(
            scanner.next_page(),
            Err(ParseError::Xml { .. })
        ));
    }

    #[test]
    fn iterator_stops_after_error() {
        let xml = "<mediawiki><page><title>A</text></page><page></page></mediawiki>";
        let results: Vec<_> = PageScanner::new(xml.as_bytes()).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn holds_nothing_between_pages() {
        let mut xml = String::from("<mediawiki>");
        for i in 0..500 {
            xml.push_str(&format!("<page><title>P{i}</title><text>{}</text></page>", "x".repeat(200)));
        }
        xml.push_str("</mediawiki>");

        let mut scanner = PageScanner::new(xml.as_bytes());
        let mut count = 0;
        while let Some(fragment) = scanner.next_page().unwrap() {
            count += 1;
            assert!(fragment.len() < 300);
            assert_eq!(scanner.pending_bytes(), 0);
        }
        assert_eq!(count, 500);
        assert_eq!(scanner.pages_emitted(), 500);
    }
}
