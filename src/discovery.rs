//! Source Discovery
//!
//! Scans a Mini Program project for the markup and stylesheet sources the
//! sync tool converts: `pages/**`, `components/**` and the global `app.wxss`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Page,
    Component,
    AppStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Language {
    Wxml,
    Wxss,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "wxml" => Some(Language::Wxml),
            "wxss" => Some(Language::Wxss),
            _ => None,
        }
    }

    /// Extension of the converted output.
    pub fn output_extension(self) -> &'static str {
        match self {
            Language::Wxml => "html",
            Language::Wxss => "css",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub kind: SourceKind,
    /// Page or component name: the directory under `pages/` or
    /// `components/`, plus the file stem when it is not `index`.
    pub name: String,
    pub language: Language,
    pub path: PathBuf,
}

/// Recursively find files with one of `extensions`, sorted by path.
pub fn find_files(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true).into_iter().flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.contains(&ext))
            .unwrap_or(false);
        if matches {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files
}

fn source_name(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let dir = relative.parent()?;
    let stem = path.file_stem()?.to_str()?;

    let mut parts: Vec<String> = dir
        .components()
        .filter_map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect();
    if stem != "index" || parts.is_empty() {
        parts.push(stem.to_string());
    }
    Some(parts.join("/"))
}

fn collect(base: &Path, kind: SourceKind, out: &mut Vec<SourceFile>) {
    if !base.exists() {
        return;
    }
    for path in find_files(base, &["wxml", "wxss"]) {
        let (Some(language), Some(name)) = (Language::from_path(&path), source_name(base, &path))
        else {
            continue;
        };
        out.push(SourceFile {
            kind,
            name,
            language,
            path,
        });
    }
}

/// Every convertible source under `root`.
pub fn discover_sources(root: &Path) -> Vec<SourceFile> {
    let mut sources = Vec::new();
    collect(&root.join("pages"), SourceKind::Page, &mut sources);
    collect(&root.join("components"), SourceKind::Component, &mut sources);

    let app_style = root.join("app.wxss");
    if app_style.is_file() {
        sources.push(SourceFile {
            kind: SourceKind::AppStyle,
            name: "app".to_string(),
            language: Language::Wxss,
            path: app_style,
        });
    }

    log::debug!("discovered {} sources under {}", sources.len(), root.display());
    sources
}

/// Sources of one page (`pages/<name>/index.*`).
pub fn page_sources(root: &Path, page: &str) -> Vec<SourceFile> {
    discover_sources(root)
        .into_iter()
        .filter(|s| s.kind == SourceKind::Page && s.name == page)
        .collect()
}
