//! Document formats and text extraction
//!
//! Format is chosen from the file extension; a trailing `.gz` is
//! decompressed transparently before the inner format is read.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

use flate2::read::MultiGzDecoder;
use scraper::{ElementRef, Html, Node, Selector};

use crate::Document;
use crate::jats::{self, ArticleSplitter};

static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("invalid selector"));

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Xml,
    Txt,
    Html,
}

impl DocumentFormat {
    /// Map a bare extension (no dot, any case) to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "xml" | "nxml" => Some(Self::Xml),
            "txt" | "text" => Some(Self::Txt),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    /// Detect the format of `path`, looking through a trailing `.gz`
    pub fn detect(path: &Path) -> Result<Self, ExtractError> {
        let inner = if is_gzip(path) {
            path.file_stem().map(Path::new)
        } else {
            Some(path)
        };
        let ext = inner
            .and_then(|p| p.extension())
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_extension(&ext).ok_or(ExtractError::UnsupportedFormat(ext))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Xml => "xml",
            Self::Txt => "txt",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extraction failures. Never retried; they affect one document or unit.
#[derive(Debug)]
pub enum ExtractError {
    /// Extension not handled (the offending extension, possibly empty)
    UnsupportedFormat(String),
    /// Bytes could not be decoded as the detected format
    Corrupt { format: DocumentFormat, message: String },
    /// File exceeds the configured size limit
    TooLarge { size: u64, limit: u64 },
    /// Underlying I/O error
    Io(io::Error),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(ext) if ext.is_empty() => {
                write!(f, "unsupported format: no extension")
            }
            Self::UnsupportedFormat(ext) => write!(f, "unsupported format: .{ext}"),
            Self::Corrupt { format, message } => write!(f, "corrupt {format} document: {message}"),
            Self::TooLarge { size, limit } => {
                write!(f, "file too large: {size} bytes (limit {limit})")
            }
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ExtractError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl ExtractError {
    fn corrupt(format: DocumentFormat, message: impl fmt::Display) -> Self {
        Self::Corrupt {
            format,
            message: message.to_string(),
        }
    }

    /// Decoder errors surface as I/O errors; reclassify them as corruption.
    pub(crate) fn from_read(format: DocumentFormat, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof => Self::corrupt(format, e),
            _ => Self::Io(e),
        }
    }
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// Open `path` for reading, gunzipping when it ends in `.gz`
pub fn open_decoded(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::with_capacity(
            256 * 1024,
            MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(256 * 1024, file)))
    }
}

fn read_all(path: &Path, format: DocumentFormat) -> Result<Vec<u8>, ExtractError> {
    let mut reader = open_decoded(path)?;
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| ExtractError::from_read(format, e))?;
    Ok(bytes)
}

/// UTF-8 when valid, Latin-1 otherwise
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

/// Plain text of a whole file. XML bundles yield the text of all articles.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let docs = extract_documents(path)?;
    Ok(jats::collapse_whitespace(docs.iter().map(|d| d.text.as_str())))
}

/// Extract the documents contained in one local file.
///
/// Non-bundle files yield a single document whose `source_id` is the file
/// name. JATS bundles yield one document per article that carries a PMC id.
pub fn extract_documents(path: &Path) -> Result<Vec<Document>, ExtractError> {
    let format = DocumentFormat::detect(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let single = |text: String| {
        vec![Document {
            source_id: name.clone(),
            text,
        }]
    };

    match format {
        DocumentFormat::Txt => Ok(single(decode_text(read_all(path, format)?))),
        DocumentFormat::Pdf => {
            let bytes = read_all(path, format)?;
            let text = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| ExtractError::corrupt(format, e))?;
            Ok(single(text))
        }
        DocumentFormat::Html => {
            let html = decode_text(read_all(path, format)?);
            Ok(single(html_text(&html)))
        }
        DocumentFormat::Xml => {
            let xml = decode_text(read_all(path, format)?);
            xml_documents(&xml, &name)
        }
    }
}

fn xml_documents(xml: &str, name: &str) -> Result<Vec<Document>, ExtractError> {
    let mut docs = Vec::new();
    let mut articles = 0usize;
    for chunk in ArticleSplitter::new(xml.as_bytes()) {
        articles += 1;
        match jats::parse_article(&chunk?) {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => log::debug!("{name}: article without PMC id skipped"),
            Err(e) => log::warn!("{name}: skipping malformed article: {e}"),
        }
    }
    if articles > 0 {
        return Ok(docs);
    }
    let text = jats::all_text(xml).map_err(|e| ExtractError::corrupt(DocumentFormat::Xml, e))?;
    Ok(vec![Document {
        source_id: name.to_string(),
        text,
    }])
}

/// Visible text of `<body>` (script and style contents excluded)
pub fn html_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts = Vec::new();
    if let Some(body) = document.select(&BODY).next() {
        collect_text(body, &mut parts);
    }
    jats::collapse_whitespace(parts)
}

fn collect_text<'a>(element: ElementRef<'a>, out: &mut Vec<&'a str>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push(&**text),
            Node::Element(el) if matches!(el.name(), "script" | "style" | "noscript") => {}
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    collect_text(el, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn detect_formats() {
        let f = |p: &str| DocumentFormat::detect(Path::new(p)).ok();
        assert_eq!(f("a.pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(f("a.XML"), Some(DocumentFormat::Xml));
        assert_eq!(f("a.htm"), Some(DocumentFormat::Html));
        assert_eq!(f("PMC1_PMC2.xml.gz"), Some(DocumentFormat::Xml));
        assert_eq!(f("notes.txt.gz"), Some(DocumentFormat::Txt));
        assert_eq!(f("a.docx"), None);
        assert_eq!(f("archive.gz"), None);
    }

    #[test]
    fn unsupported_format_error() {
        let err = DocumentFormat::detect(Path::new("a.docx")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(ref e) if e == "docx"));
        assert_eq!(err.to_string(), "unsupported format: .docx");
    }

    #[test]
    fn txt_utf8_and_latin1() {
        let dir = TempDir::new().unwrap();
        let utf8 = write(&dir, "a.txt", "café syn1234567".as_bytes());
        assert_eq!(extract_text(&utf8).unwrap(), "café syn1234567");

        // 0xE9 = é in Latin-1, invalid as UTF-8
        let latin1 = write(&dir, "b.txt", b"caf\xe9 syn1234567");
        assert_eq!(extract_text(&latin1).unwrap(), "café syn1234567");
    }

    #[test]
    fn txt_document_named_after_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.txt", b"see syn1234567");
        let docs = extract_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_id, "notes.txt");
    }

    #[test]
    fn gzipped_txt() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.txt.gz", &gzip(b"zipped syn1234567"));
        assert_eq!(extract_text(&path).unwrap(), "zipped syn1234567");
    }

    #[test]
    fn corrupt_gzip_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.txt.gz", b"definitely not gzip");
        let err = extract_documents(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt { .. }), "{err}");
    }

    #[test]
    fn corrupt_pdf_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.pdf", b"%PDF-1.4 garbage");
        let err = extract_documents(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt { format: DocumentFormat::Pdf, .. }));
    }

    #[test]
    fn html_body_text_only() {
        let html = r#"<html><head><title>T</title><style>p{}</style></head>
            <body><p>Data: <a href="x">syn1234567</a></p><script>var syn=1;</script></body></html>"#;
        assert_eq!(html_text(html), "Data: syn1234567");
    }

    #[test]
    fn xml_bundle_yields_articles() {
        let dir = TempDir::new().unwrap();
        let bundle = r#"<pmc-articleset>
<article><front><article-id pub-id-type="pmc">PMC1</article-id></front><body>one syn1111111</body></article>
<article><front><article-id pub-id-type="pmc">PMC2</article-id></front><body>two</body></article>
</pmc-articleset>"#;
        let path = write(&dir, "PMC1_PMC2.xml.gz", &gzip(bundle.as_bytes()));
        let docs = extract_documents(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source_id, "pmc:PMC1");
        assert_eq!(docs[0].text, "one syn1111111");
        assert_eq!(docs[1].source_id, "pmc:PMC2");
    }

    #[test]
    fn plain_xml_is_single_document() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "data.xml", b"<root><item>syn1234567</item><item>x</item></root>");
        let docs = extract_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_id, "data.xml");
        assert_eq!(docs[0].text, "syn1234567 x");
    }

    #[test]
    fn missing_file_is_io() {
        let err = extract_documents(Path::new("/nonexistent/a.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }
}
