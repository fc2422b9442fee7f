//! Preview Sync
//!
//! Converts a Mini Program project into static preview files: one full HTML
//! document plus stylesheet per page, markup and style fragments per
//! component, and `app.css` for the global stylesheet. `watch` re-runs the
//! sync after edits settle.

use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};

use crate::cache::ConversionCache;
use crate::config::{ResourceMapping, SyncConfig};
use crate::discovery::{self, Language, SourceFile, SourceKind};
use crate::error::SyncError;
use crate::{wxml, wxss};

/// Placeholder in the preview page replaced with navigation links.
pub const NAVIGATION_MARKER: &str = "<!-- SYNC_NAVIGATION -->";

/// Extensions whose changes trigger a re-sync.
const WATCHED_EXTENSIONS: &[&str] = &["wxml", "wxss", "js", "json"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Every file written, in job order.
    pub written: Vec<PathBuf>,
    /// Sources converted this run.
    pub converted: usize,
    /// Sources whose output came from the cache.
    pub cached: usize,
}

impl SyncReport {
    fn merge(&mut self, other: SyncReport) {
        self.written.extend(other.written);
        self.converted += other.converted;
        self.cached += other.cached;
    }
}

/// One source → one output file.
#[derive(Debug, Clone)]
struct Job {
    source: SourceFile,
    output: PathBuf,
    /// Page name when the markup must be wrapped in a preview document.
    page: Option<String>,
}

struct JobOutcome {
    output: PathBuf,
    cached: bool,
}

pub struct SyncTool {
    config: SyncConfig,
    cache: ConversionCache,
}

impl SyncTool {
    pub fn new(config: SyncConfig) -> Self {
        let cache = ConversionCache::new(&config.cache_dir);
        SyncTool { config, cache }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Forget every cached conversion so the next sync converts everything.
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    /// Sync the configured pages, every component, the global stylesheet,
    /// then refresh the preview page's navigation.
    pub fn sync_all(&self) -> Result<SyncReport, SyncError> {
        log::info!("syncing {}", self.config.project_root.display());
        let mut report = SyncReport::default();

        for page in &self.config.sync_pages {
            report.merge(self.sync_page(page)?);
        }
        report.merge(self.sync_components()?);
        report.merge(self.sync_global_styles()?);
        if let Some(path) = self.update_preview_navigation()? {
            report.written.push(path);
        }

        log::info!(
            "sync finished: {} written, {} converted, {} cached",
            report.written.len(),
            report.converted,
            report.cached
        );
        Ok(report)
    }

    /// `pages/<name>/index.wxml` → `<name>.html`, `index.wxss` → `<name>.css`.
    pub fn sync_page(&self, name: &str) -> Result<SyncReport, SyncError> {
        let page_dir = self.config.pages_dir().join(name);
        if !page_dir.is_dir() {
            return Err(SyncError::PageNotFound(name.to_string()));
        }
        log::info!("syncing page {}", name);

        let sources = discovery::page_sources(&self.config.project_root, name);
        for language in [Language::Wxml, Language::Wxss] {
            if !sources.iter().any(|s| s.language == language) {
                log::warn!("page {} has no index.{:?} source", name, language);
            }
        }

        let jobs = sources
            .into_iter()
            .map(|source| {
                let output = self
                    .config
                    .output_dir
                    .join(format!("{}.{}", name, source.language.output_extension()));
                let page = (source.language == Language::Wxml).then(|| name.to_string());
                Job {
                    source,
                    output,
                    page,
                }
            })
            .collect();
        self.run_jobs(jobs)
    }

    /// `components/<name>/*` → `components/<name>.html|.css` fragments.
    pub fn sync_components(&self) -> Result<SyncReport, SyncError> {
        let out_dir = self.config.output_dir.join("components");
        let jobs = discovery::discover_sources(&self.config.project_root)
            .into_iter()
            .filter(|s| s.kind == SourceKind::Component)
            .map(|source| Job {
                output: out_dir.join(format!(
                    "{}.{}",
                    source.name,
                    source.language.output_extension()
                )),
                source,
                page: None,
            })
            .collect();
        self.run_jobs(jobs)
    }

    /// `app.wxss` → `app.css`.
    pub fn sync_global_styles(&self) -> Result<SyncReport, SyncError> {
        let jobs = discovery::discover_sources(&self.config.project_root)
            .into_iter()
            .filter(|s| s.kind == SourceKind::AppStyle)
            .map(|source| Job {
                source,
                output: self.config.output_dir.join("app.css"),
                page: None,
            })
            .collect();
        self.run_jobs(jobs)
    }

    /// Replace the navigation marker in the preview page with links to the
    /// synced pages. Returns the page path when it was rewritten.
    pub fn update_preview_navigation(&self) -> Result<Option<PathBuf>, SyncError> {
        let path = self.config.output_dir.join(&self.config.html_template);
        if !path.is_file() {
            log::debug!("no preview page at {}", path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| SyncError::io(&path, e))?;
        if !content.contains(NAVIGATION_MARKER) {
            return Ok(None);
        }

        let updated = content.replacen(
            NAVIGATION_MARKER,
            &navigation_html(&self.config.sync_pages),
            1,
        );
        fs::write(&path, updated).map_err(|e| SyncError::io(&path, e))?;
        log::info!("updated navigation in {}", path.display());
        Ok(Some(path))
    }

    fn run_jobs(&self, jobs: Vec<Job>) -> Result<SyncReport, SyncError> {
        let outcomes = jobs
            .par_iter()
            .map(|job| self.run_job(job))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = SyncReport::default();
        for outcome in outcomes {
            if outcome.cached {
                report.cached += 1;
            } else {
                report.converted += 1;
            }
            report.written.push(outcome.output);
        }
        Ok(report)
    }

    fn run_job(&self, job: &Job) -> Result<JobOutcome, SyncError> {
        let path = &job.source.path;
        let source = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
        let key = path
            .strip_prefix(&self.config.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        let (converted, cached) = match self.cache.get(&key, &source) {
            Some(output) => (output, true),
            None => {
                let output = match job.source.language {
                    Language::Wxml => wxml::convert(&source),
                    Language::Wxss => wxss::convert(&source),
                };
                self.cache.set(&key, &source, &output);
                (output, false)
            }
        };

        let contents = match &job.page {
            Some(page) => generate_full_html(
                &apply_resource_mapping(&converted, &self.config.resource_mapping),
                page,
            ),
            None => converted,
        };

        if let Some(parent) = job.output.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        fs::write(&job.output, contents).map_err(|e| SyncError::io(&job.output, e))?;
        log::debug!(
            "{} -> {}{}",
            key,
            job.output.display(),
            if cached { " (cached)" } else { "" }
        );

        Ok(JobOutcome {
            output: job.output.clone(),
            cached,
        })
    }
}

/// Substitute mapped local image paths, then mapped API URLs. Matches are
/// literal.
pub fn apply_resource_mapping(content: &str, mapping: &ResourceMapping) -> String {
    mapping
        .local_images
        .iter()
        .chain(&mapping.api_mapping)
        .fold(content.to_string(), |acc, (from, to)| {
            acc.replace(from.as_str(), to)
        })
}

/// Wrap converted page markup in a standalone preview document linking
/// `app.css` and the page stylesheet.
pub fn generate_full_html(body: &str, page: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{page} - preview</title>
    <link rel="stylesheet" href="app.css">
    <link rel="stylesheet" href="{page}.css">
    <style>
        body {{
            margin: 0;
            padding: 0;
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'PingFang SC', 'Hiragino Sans GB', 'Microsoft YaHei', sans-serif;
            background-color: #f5f5f5;
        }}
        .page-container {{
            max-width: 375px;
            margin: 0 auto;
            background: white;
            min-height: 100vh;
            position: relative;
        }}
        .debug-info {{
            position: fixed;
            top: 10px;
            right: 10px;
            background: rgba(0,0,0,0.8);
            color: white;
            padding: 5px 10px;
            border-radius: 4px;
            font-size: 12px;
            z-index: 9999;
        }}
    </style>
</head>
<body>
    <div class="debug-info">{page} preview</div>
    <div class="page-container">
{body}
    </div>
</body>
</html>
"#
    )
}

pub fn navigation_html(pages: &[String]) -> String {
    let links: String = pages
        .iter()
        .map(|page| {
            format!(
                r#"<a href="{page}.html" style="display:block;padding:10px;margin:5px;background:#007aff;color:white;text-decoration:none;border-radius:4px;">{page}</a>"#
            )
        })
        .collect();
    format!(
        r#"<div style="position:fixed;top:50px;right:10px;background:white;padding:10px;border-radius:8px;box-shadow:0 2px 10px rgba(0,0,0,0.1);z-index:10000;"><h4 style="margin:0 0 10px 0;">Pages</h4>{links}</div>"#
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// WATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Coalesces change events per path: a path becomes due once it has been
/// quiet for the whole window.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Debouncer {
            quiet,
            pending: HashMap::new(),
        }
    }

    pub fn record(&mut self, path: PathBuf, at: Instant) {
        self.pending.insert(path, at);
    }

    /// Remove and return the paths quiet since `now - quiet`, sorted.
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let quiet = self.quiet;
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) >= quiet)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.pending.remove(path);
        }
        due.sort();
        due
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

fn is_watched_source(path: &Path, config: &SyncConfig) -> bool {
    if path.starts_with(&config.cache_dir) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| WATCHED_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// Watch `pages/`, `components/` and the project root, re-running
/// `sync_all` once edits settle. Blocks until the watcher shuts down.
pub fn watch(tool: &SyncTool) -> Result<(), SyncError> {
    let config = tool.config();
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = tx.send(res);
    })?;

    for dir in [config.pages_dir(), config.components_dir()] {
        if dir.is_dir() {
            watcher.watch(&dir, RecursiveMode::Recursive)?;
        }
    }
    // app.wxss, app.js and app.json live in the root
    watcher.watch(&config.project_root, RecursiveMode::NonRecursive)?;
    log::info!("watching {}", config.project_root.display());

    let mut debouncer = Debouncer::new(config.debounce());
    let poll = Duration::from_millis(100).min(config.debounce().max(Duration::from_millis(1)));
    loop {
        match rx.recv_timeout(poll) {
            Ok(Ok(event)) => {
                for path in event.paths {
                    if is_watched_source(&path, config) {
                        log::info!("changed: {}", path.display());
                        debouncer.record(path, Instant::now());
                    }
                }
            }
            Ok(Err(e)) => log::warn!("watch error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        if debouncer.take_due(Instant::now()).is_empty() {
            continue;
        }
        if let Err(e) = tool.sync_all() {
            log::error!("sync failed: {}", e);
        }
    }
}
