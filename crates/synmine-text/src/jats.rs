//! JATS article parsing using quick-xml
//!
//! PMC bundles concatenate many `<article>` documents. [`ArticleSplitter`]
//! streams them out of a reader one at a time; [`parse_article`] turns one
//! article into a searchable [`Document`].

use std::borrow::Cow;
use std::io::{self, BufRead};
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};
use regex::Regex;

use crate::Document;

const ARTICLE_OPEN: &[u8] = b"<article";
const ARTICLE_CLOSE: &[u8] = b"</article>";

/// Fallback when no `<article-id>` carries the PMC id
static PMC_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:PMC|pmc)(\d+)").expect("invalid PMC pattern"));

/// Streams `<article …>…</article>` chunks out of a bundle.
///
/// Bytes outside articles are discarded as they are read, so memory stays
/// bounded by the largest single article.
pub struct ArticleSplitter<R> {
    reader: R,
    buf: Vec<u8>,
    /// Offset of the current article's opening tag
    start: Option<usize>,
    /// Resume point for the next search
    scan: usize,
    eof: bool,
}

impl<R: BufRead> ArticleSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            start: None,
            scan: 0,
            eof: false,
        }
    }

    fn take_article(&mut self) -> Option<String> {
        let start = match self.start {
            Some(s) => s,
            None => match find_open_tag(&self.buf, self.scan) {
                OpenTag::Found(i) => {
                    self.start = Some(i);
                    self.scan = i + ARTICLE_OPEN.len();
                    i
                }
                OpenTag::NeedMore(keep) => {
                    self.buf.drain(..keep);
                    self.scan = 0;
                    return None;
                }
            },
        };

        match find(&self.buf, ARTICLE_CLOSE, self.scan) {
            Some(j) => {
                let end = j + ARTICLE_CLOSE.len();
                let chunk = String::from_utf8_lossy(&self.buf[start..end]).into_owned();
                self.buf.drain(..end);
                self.start = None;
                self.scan = 0;
                Some(chunk)
            }
            None => {
                self.scan = self.buf.len().saturating_sub(ARTICLE_CLOSE.len() - 1).max(start);
                None
            }
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let available = self.reader.fill_buf()?;
        if available.is_empty() {
            self.eof = true;
            return Ok(());
        }
        let n = available.len();
        self.buf.extend_from_slice(available);
        self.reader.consume(n);
        Ok(())
    }
}

impl<R: BufRead> Iterator for ArticleSplitter<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.take_article() {
                return Some(Ok(chunk));
            }
            if self.eof {
                if self.start.take().is_some() {
                    log::debug!("Dropping truncated article at end of input");
                }
                return None;
            }
            if let Err(e) = self.fill() {
                self.eof = true;
                return Some(Err(e));
            }
        }
    }
}

enum OpenTag {
    Found(usize),
    /// Not found; bytes before this offset can be dropped
    NeedMore(usize),
}

/// Find `<article` followed by whitespace or `>` (not `<article-id` etc.)
fn find_open_tag(buf: &[u8], from: usize) -> OpenTag {
    let mut from = from;
    while let Some(i) = find(buf, ARTICLE_OPEN, from) {
        match buf.get(i + ARTICLE_OPEN.len()) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' => return OpenTag::Found(i),
            Some(_) => from = i + 1,
            // Tag name may continue in the next read
            None => return OpenTag::NeedMore(i),
        }
    }
    OpenTag::NeedMore(buf.len().saturating_sub(ARTICLE_OPEN.len() - 1))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Sections that contribute searchable text, in output order
#[derive(Default)]
struct Sections {
    title: Option<String>,
    abstract_text: Option<String>,
    body: Option<String>,
    back: Option<String>,
}

/// Parse one JATS article into a document.
///
/// Returns `Ok(None)` when the article carries no PMC id.
pub fn parse_article(xml: &str) -> Result<Option<Document>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut pmc_id: Option<String> = None;
    let mut sections = Sections::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"article-id" if pmc_id.is_none() && is_pmc_id(&e) => {
                    let id = read_section_text(&mut reader, b"article-id")?;
                    let id = id.trim();
                    if !id.is_empty() {
                        pmc_id = Some(id.to_string());
                    }
                }
                b"article-title" if sections.title.is_none() => {
                    sections.title = Some(read_section_text(&mut reader, b"article-title")?);
                }
                b"abstract" if sections.abstract_text.is_none() => {
                    sections.abstract_text = Some(read_section_text(&mut reader, b"abstract")?);
                }
                b"body" if sections.body.is_none() => {
                    sections.body = Some(read_section_text(&mut reader, b"body")?);
                }
                b"back" if sections.back.is_none() => {
                    sections.back = Some(read_section_text(&mut reader, b"back")?);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let pmc_id = match pmc_id {
        Some(id) => id,
        None => match PMC_FALLBACK.captures(xml) {
            Some(caps) => caps[1].to_string(),
            None => return Ok(None),
        },
    };

    let parts = [
        sections.title,
        sections.abstract_text,
        sections.body,
        sections.back,
    ];
    let text = collapse_whitespace(parts.iter().flatten().map(String::as_str));

    Ok(Some(Document {
        source_id: bioregistry_id(&pmc_id),
        text,
    }))
}

/// `12345`, `PMC12345`, `pmc12345` → `pmc:PMC12345`
pub fn bioregistry_id(pmc_id: &str) -> String {
    let digits = pmc_id
        .strip_prefix("PMC")
        .or_else(|| pmc_id.strip_prefix("pmc"))
        .unwrap_or(pmc_id);
    format!("pmc:PMC{digits}")
}

/// All character data of an XML document, whitespace-collapsed
pub fn all_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut parts: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => parts.push(text_of(&e).into_owned()),
            Event::CData(e) => parts.push(String::from_utf8_lossy(&e).into_owned()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(collapse_whitespace(parts.iter().map(String::as_str)))
}

fn is_pmc_id(e: &BytesStart<'_>) -> bool {
    e.attributes().flatten().any(|attr| {
        attr.key.as_ref() == b"pub-id-type" && matches!(attr.value.as_ref(), b"pmc" | b"pmcid")
    })
}

/// Read text content of an element, separating nested elements with spaces
fn read_section_text(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<String, quick_xml::Error> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&text_of(&e)),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::Start(_) => {
                depth += 1;
                text.push(' ');
            }
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
                text.push(' ');
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Unescaped text, falling back to the raw bytes on unknown entities
fn text_of<'a>(e: &'a BytesText<'_>) -> Cow<'a, str> {
    match e.unescape() {
        Ok(s) => s,
        Err(_) => String::from_utf8_lossy(e),
    }
}

/// Join parts with single spaces, collapsing every whitespace run
pub fn collapse_whitespace<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for word in parts.into_iter().flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<article article-type="research-article" xmlns:xlink="http://www.w3.org/1999/xlink">
  <front>
    <article-meta>
      <article-id pub-id-type="pmid">999</article-id>
      <article-id pub-id-type="pmc">PMC1234567</article-id>
      <title-group><article-title>Data in <italic>syn1234567</italic></article-title></title-group>
      <abstract><p>We   deposited
      data.</p></abstract>
    </article-meta>
  </front>
  <body><p>Available at syn7654321 &amp; more.</p></body>
  <back><ref-list><ref><article-title>Cited</article-title></ref></ref-list></back>
</article>"#;

    #[test]
    fn parse_basic_article() {
        let doc = parse_article(ARTICLE).unwrap().unwrap();
        assert_eq!(doc.source_id, "pmc:PMC1234567");
        assert_eq!(
            doc.text,
            "Data in syn1234567 We deposited data. Available at syn7654321 & more. Cited"
        );
    }

    #[test]
    fn numeric_pmcid_gets_prefix() {
        let xml = r#"<article><front><article-id pub-id-type="pmcid">42</article-id></front><body>x</body></article>"#;
        let doc = parse_article(xml).unwrap().unwrap();
        assert_eq!(doc.source_id, "pmc:PMC42");
    }

    #[test]
    fn fallback_to_pmc_pattern() {
        let xml = r#"<article><front><self-uri>pmc777</self-uri></front><body>text</body></article>"#;
        let doc = parse_article(xml).unwrap().unwrap();
        assert_eq!(doc.source_id, "pmc:PMC777");
        assert_eq!(doc.text, "text");
    }

    #[test]
    fn article_without_id_is_skipped() {
        let xml = "<article><body>syn1234567</body></article>";
        assert!(parse_article(xml).unwrap().is_none());
    }

    #[test]
    fn malformed_article_errors() {
        let xml = r#"<article><article-id pub-id-type="pmc">1</article-id><body><p>x</body></article>"#;
        assert!(parse_article(xml).is_err());
    }

    #[test]
    fn bioregistry_prefix() {
        assert_eq!(bioregistry_id("PMC1234567"), "pmc:PMC1234567");
        assert_eq!(bioregistry_id("pmc1234567"), "pmc:PMC1234567");
        assert_eq!(bioregistry_id("1234567"), "pmc:PMC1234567");
    }

    #[test]
    fn splitter_yields_each_article() {
        let bundle = format!(
            "<?xml version=\"1.0\"?>\n<pmc-articleset>{ARTICLE}\n{ARTICLE}</pmc-articleset>"
        );
        let chunks: Vec<String> = ArticleSplitter::new(bundle.as_bytes())
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("<article article-type"));
        assert!(chunks[0].ends_with("</article>"));
        assert_eq!(chunks[0], ARTICLE);
    }

    #[test]
    fn splitter_handles_tiny_reads() {
        let bundle = format!("junk{ARTICLE}junk<article>second</article>tail");
        // 3-byte buffer forces tags to straddle reads
        let reader = io::BufReader::with_capacity(3, bundle.as_bytes());
        let chunks: Vec<String> = ArticleSplitter::new(reader)
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], ARTICLE);
        assert_eq!(chunks[1], "<article>second</article>");
    }

    #[test]
    fn splitter_ignores_article_prefixed_tags() {
        let input = "<article-meta>x</article-meta><article-title>t</article-title>";
        assert_eq!(ArticleSplitter::new(input.as_bytes()).count(), 0);
    }

    #[test]
    fn splitter_drops_truncated_tail() {
        let input = "<article><body>done</body></article><article><body>cut";
        let chunks: Vec<String> = ArticleSplitter::new(input.as_bytes())
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(chunks, vec!["<article><body>done</body></article>".to_string()]);
    }

    #[test]
    fn all_text_collapses() {
        let xml = "<root><a>one\n two</a><b>three</b></root>";
        assert_eq!(all_text(xml).unwrap(), "one two three");
    }
}
