//! Local file mining and bundle scanning

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use synmine_core::{Finding, ProgressContext, is_shutdown_requested};

use crate::config::MinerConfig;
use crate::format::{ExtractError, extract_documents};
use crate::jats::{ArticleSplitter, parse_article};
use crate::matcher::PatternMatcher;
use crate::{Document, DocumentFormat};

/// How many ids the summary ranks
const TOP_IDS: usize = 10;

/// Result of scanning one PMC bundle
#[derive(Debug, Default)]
pub struct BundleScan {
    /// Article chunks seen
    pub articles: usize,
    /// Articles skipped (no PMC id or malformed)
    pub skipped: usize,
    pub findings: Vec<Finding>,
}

/// Stream articles out of `reader`, matching `batch_size` of them at a time
/// in parallel. Findings keep article order.
pub fn scan_bundle<R: BufRead>(
    reader: R,
    matcher: &PatternMatcher,
    batch_size: usize,
    pb: &ProgressBar,
) -> Result<BundleScan, ExtractError> {
    let mut scan = BundleScan::default();
    let mut chunk: Vec<String> = Vec::with_capacity(batch_size);
    let mut articles = ArticleSplitter::new(reader);

    loop {
        let next = articles
            .next()
            .transpose()
            .map_err(|e| ExtractError::from_read(DocumentFormat::Xml, e))?;
        let done = next.is_none();
        if let Some(article) = next {
            chunk.push(article);
        }
        if chunk.len() >= batch_size.max(1) || (done && !chunk.is_empty()) {
            match_chunk(&chunk, matcher, &mut scan);
            pb.inc(chunk.len() as u64);
            chunk.clear();
        }
        if done {
            break;
        }
    }

    Ok(scan)
}

fn match_chunk(chunk: &[String], matcher: &PatternMatcher, scan: &mut BundleScan) {
    let results: Vec<Option<Vec<Finding>>> = chunk
        .par_iter()
        .map(|xml| match parse_article(xml) {
            Ok(Some(doc)) => Some(matcher.find_all(&doc.text, &doc.source_id)),
            Ok(None) => None,
            Err(e) => {
                log::debug!("Skipping malformed article: {e}");
                None
            }
        })
        .collect();

    scan.articles += results.len();
    for found in results {
        match found {
            Some(found) => scan.findings.extend(found),
            None => scan.skipped += 1,
        }
    }
}

/// Match every document, preserving document order
pub fn match_documents(docs: &[Document], matcher: &PatternMatcher) -> Vec<Finding> {
    docs.par_iter()
        .map(|d| matcher.find_all(&d.text, &d.source_id))
        .collect::<Vec<_>>()
        .concat()
}

/// Aggregate statistics over a set of findings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub documents: usize,
    pub total_mentions: usize,
    pub unique_ids: usize,
    /// Most frequent ids by number of documents mentioning them
    pub top_ids: Vec<(String, usize)>,
}

impl Summary {
    pub fn from_findings(findings: &[Finding], documents: usize) -> Self {
        let mut doc_freq: HashMap<&str, HashSet<&str>> = HashMap::new();
        for f in findings {
            doc_freq
                .entry(f.synapse_id.as_str())
                .or_default()
                .insert(f.source_id.as_str());
        }

        let mut top_ids: Vec<(String, usize)> = doc_freq
            .iter()
            .map(|(id, docs)| (id.to_string(), docs.len()))
            .collect();
        top_ids.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_ids.truncate(TOP_IDS);

        Self {
            documents,
            total_mentions: findings.len(),
            unique_ids: doc_freq.len(),
            top_ids,
        }
    }
}

/// Outcome of a local run
#[derive(Debug)]
pub struct LocalReport {
    pub findings: Vec<Finding>,
    pub files_processed: usize,
    pub files_failed: usize,
    pub summary: Summary,
    pub elapsed: Duration,
}

/// Lowercase final extension with leading dot (`a.XML.GZ` → `.gz`)
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Reject files with a disallowed extension or over the size limit.
pub fn check_file(path: &Path, config: &MinerConfig) -> Result<(), ExtractError> {
    let ext = dotted_extension(path);
    if !config.allows_extension(&ext) {
        return Err(ExtractError::UnsupportedFormat(
            ext.trim_start_matches('.').to_string(),
        ));
    }
    let size = std::fs::metadata(path)?.len();
    if size > config.max_file_size {
        return Err(ExtractError::TooLarge {
            size,
            limit: config.max_file_size,
        });
    }
    Ok(())
}

/// Files to process under `path`: the file itself, or every allowed file
/// below a directory in sorted order.
pub fn collect_files(path: &Path, config: &MinerConfig) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&path.to_string_lossy())
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .context("Invalid directory pattern")?
        .filter_map(|entry| match entry {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("Unreadable entry: {e}");
                None
            }
        })
        .filter(|p| p.is_file() && config.allows_extension(&dotted_extension(p)))
        .collect();
    files.sort();
    Ok(files)
}

/// Extract and match one local file; returns (documents, findings).
pub fn process_file(
    path: &Path,
    config: &MinerConfig,
    matcher: &PatternMatcher,
) -> Result<(usize, Vec<Finding>), ExtractError> {
    check_file(path, config)?;
    let docs = extract_documents(path)?;
    Ok((docs.len(), match_documents(&docs, matcher)))
}

/// Process a local file or directory.
///
/// Per-file failures are logged and counted; they never stop the run.
pub fn process_path(
    path: &Path,
    config: &MinerConfig,
    sequential: bool,
    progress: &ProgressContext,
) -> Result<LocalReport> {
    let start = Instant::now();
    config.validate().context("Invalid miner configuration")?;

    let files = collect_files(path, config)?;
    if files.is_empty() {
        log::warn!("No files with allowed extensions under {}", path.display());
    }
    log::info!(
        "Processing {} file(s) with {} worker(s)",
        files.len(),
        if sequential { 1 } else { config.workers }
    );

    let matcher = PatternMatcher::from_config(config);
    let overall = progress.overall_bar(files.len(), "process");
    let failed = AtomicUsize::new(0);

    let run_one = |file: &PathBuf| -> Option<(usize, Vec<Finding>)> {
        if is_shutdown_requested() {
            return None;
        }
        let result = process_file(file, config, &matcher);
        overall.inc(1);
        match result {
            Ok((docs, found)) => {
                log::debug!(
                    "{}: {} document(s), {} finding(s)",
                    file.display(),
                    docs,
                    found.len()
                );
                Some((docs, found))
            }
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                log::error!("{}: {e}", file.display());
                None
            }
        }
    };

    let outcomes: Vec<Option<(usize, Vec<Finding>)>> = if sequential {
        files.iter().map(run_one).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .context("Failed to create thread pool")?;
        pool.install(|| files.par_iter().map(run_one).collect())
    };
    overall.finish_and_clear();

    let mut findings = Vec::new();
    let mut documents = 0;
    let mut processed = 0;
    for (docs, found) in outcomes.into_iter().flatten() {
        processed += 1;
        documents += docs;
        findings.extend(found);
    }

    let summary = Summary::from_findings(&findings, documents);
    let report = LocalReport {
        findings,
        files_processed: processed,
        files_failed: failed.load(Ordering::Relaxed),
        summary,
        elapsed: start.elapsed(),
    };

    log::info!(
        "Files: {} processed, {} failed; {} finding(s) in {:.1}s",
        report.files_processed,
        report.files_failed,
        report.summary.total_mentions,
        report.elapsed.as_secs_f64()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn finding(src: &str, id: &str) -> Finding {
        Finding {
            source_id: src.into(),
            synapse_id: id.into(),
            context_before: String::new(),
            context_after: String::new(),
            position: 0,
        }
    }

    #[test]
    fn summary_ranks_by_document_frequency() {
        let findings = vec![
            finding("a", "syn2222222"),
            finding("a", "syn1111111"),
            finding("b", "syn1111111"),
            finding("b", "syn1111111"),
            finding("c", "syn3333333"),
        ];
        let s = Summary::from_findings(&findings, 3);
        assert_eq!(s.documents, 3);
        assert_eq!(s.total_mentions, 5);
        assert_eq!(s.unique_ids, 3);
        assert_eq!(s.top_ids[0], ("syn1111111".to_string(), 2));
        // Ties broken by id
        assert_eq!(s.top_ids[1], ("syn2222222".to_string(), 1));
        assert_eq!(s.top_ids[2], ("syn3333333".to_string(), 1));
    }

    #[test]
    fn summary_keeps_top_ten() {
        let findings: Vec<Finding> = (0..15)
            .map(|i| finding("d", &format!("syn{:07}", 1_000_000 + i)))
            .collect();
        assert_eq!(Summary::from_findings(&findings, 1).top_ids.len(), 10);
    }

    #[test]
    fn scan_bundle_matches_in_order() {
        let bundle = r#"<set>
<article><article-id pub-id-type="pmc">PMC1</article-id><body>a syn1111111 b</body></article>
<article><body>no id here</body></article>
<article><article-id pub-id-type="pmc">PMC3</article-id><body>syn3333333 syn3333333</body></article>
</set>"#;
        let matcher = PatternMatcher::new(2, true);
        let scan = scan_bundle(bundle.as_bytes(), &matcher, 2, &ProgressBar::hidden()).unwrap();

        assert_eq!(scan.articles, 3);
        assert_eq!(scan.skipped, 1);
        let got: Vec<(&str, &str)> = scan
            .findings
            .iter()
            .map(|f| (f.source_id.as_str(), f.synapse_id.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![("pmc:PMC1", "syn1111111"), ("pmc:PMC3", "syn3333333")]
        );
    }

    #[test]
    fn collect_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "x").unwrap();
        std::fs::write(dir.path().join("a.pdf"), "x").unwrap();
        std::fs::write(dir.path().join("c.docx"), "x").unwrap();
        std::fs::write(dir.path().join("sub/d.xml"), "x").unwrap();

        let files = collect_files(dir.path(), &MinerConfig::default()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.txt", "sub/d.xml"]);
    }

    #[test]
    fn check_file_limits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "0123456789").unwrap();

        let config = MinerConfig {
            max_file_size: 5,
            ..Default::default()
        };
        assert!(matches!(
            check_file(&path, &config),
            Err(ExtractError::TooLarge { size: 10, limit: 5 })
        ));

        let docx = dir.path().join("a.docx");
        std::fs::write(&docx, "x").unwrap();
        assert!(matches!(
            check_file(&docx, &MinerConfig::default()),
            Err(ExtractError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn process_directory_counts_failures() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("one.txt"), "see syn1234567 and syn1234567").unwrap();
        std::fs::write(dir.path().join("two.html"), "<body>syn7654321</body>").unwrap();
        std::fs::write(dir.path().join("bad.pdf"), "not a pdf").unwrap();

        let config = MinerConfig {
            workers: 2,
            ..Default::default()
        };
        let report = process_path(dir.path(), &config, false, &ProgressContext::hidden()).unwrap();

        assert_eq!(report.files_processed, 2);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.summary.documents, 2);
        let mut ids: Vec<&str> = report.findings.iter().map(|f| f.synapse_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["syn1234567", "syn7654321"]);
    }

    #[test]
    fn process_missing_path_errors() {
        let result = process_path(
            Path::new("/nonexistent/dir"),
            &MinerConfig::default(),
            true,
            &ProgressContext::hidden(),
        );
        assert!(result.is_err());
    }
}
