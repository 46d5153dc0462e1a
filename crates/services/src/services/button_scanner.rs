//! Static audit of `<button>` elements in frontend sources.
//!
//! Each opening tag is checked for an action (a handler, a link or a submit
//! type) and for an accessible name. The scanner works on raw text, so it is a
//! heuristic: it does not parse JSX and will not follow spread props.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    io,
    path::{Path, PathBuf},
};

use ignore::WalkBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, warn};

/// File extensions that are read; everything else is skipped.
pub const SCANNED_EXTENSIONS: &[&str] = &["tsx", "jsx", "ts", "js", "html", "vue"];

const SNIPPET_MAX_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum IssueKind {
    /// No `onClick`, `onSubmit`, `href`, submit type or `asChild`.
    MissingHandler,
    /// Nothing a screen reader could announce.
    MissingAccessibleLabel,
    /// `onClick={() => {}}` or `onClick={undefined}`.
    EmptyHandler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonFinding {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub snippet: String,
    pub issues: Vec<IssueKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub files_scanned: usize,
    pub buttons_found: usize,
    pub issue_counts: BTreeMap<IssueKind, usize>,
    /// Only buttons with at least one issue.
    pub findings: Vec<ButtonFinding>,
}

impl ScanReport {
    pub fn total_issues(&self) -> usize {
        self.issue_counts.values().sum()
    }

    pub fn has_issues(&self) -> bool {
        self.total_issues() > 0
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for finding in &self.findings {
            let kinds = finding
                .issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                out,
                "{}:{}:{}: [{}] {}",
                finding.file.display(),
                finding.line,
                finding.column,
                kinds,
                finding.snippet
            );
        }
        let _ = writeln!(
            out,
            "Scanned {} files, found {} buttons, {} issues",
            self.files_scanned,
            self.buttons_found,
            self.total_issues()
        );
        for (kind, count) in &self.issue_counts {
            let _ = writeln!(out, "  {kind}: {count}");
        }
        out
    }

    fn absorb(&mut self, found: usize, findings: Vec<ButtonFinding>) {
        self.files_scanned += 1;
        self.buttons_found += found;
        for finding in findings {
            for issue in &finding.issues {
                *self.issue_counts.entry(*issue).or_insert(0) += 1;
            }
            self.findings.push(finding);
        }
    }
}

pub struct ButtonScanner {
    open_tag: Regex,
    handler: Regex,
    submit_type: Regex,
    label: Regex,
    empty_handler: Regex,
}

impl ButtonScanner {
    pub fn new() -> Result<Self, ScanError> {
        Ok(Self {
            open_tag: Regex::new(r"<(button|Button)\b")?,
            handler: Regex::new(
                r"(?:^|\s)(?:onClick|onclick|onSubmit|onsubmit|href|asChild|@click|v-on:click)\b",
            )?,
            submit_type: Regex::new(r#"(?:^|\s)type\s*=\s*\{?\s*["']submit["']"#)?,
            label: Regex::new(r"(?:^|\s)(?:aria-label|aria-labelledby|title)\s*=")?,
            empty_handler: Regex::new(
                r"onClick\s*=\s*\{\s*(?:\(\s*\)\s*=>\s*\{\s*\}|undefined)\s*\}",
            )?,
        })
    }

    /// Walk `root` (honouring `.gitignore`) and audit every source file.
    pub fn scan_dir(&self, root: &Path) -> Result<ScanReport, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut report = ScanReport {
            root: root.to_path_buf(),
            ..Default::default()
        };
        let walker = WalkBuilder::new(root)
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != "node_modules")
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) || !has_scanned_extension(path) {
                continue;
            }

            let source = match std::fs::read_to_string(path) {
                Ok(source) => source,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    warn!(path = %path.display(), "Skipping file that is not UTF-8");
                    continue;
                }
                Err(source) => {
                    return Err(ScanError::Read {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            };

            let relative = path.strip_prefix(root).unwrap_or(path);
            let (found, findings) = self.scan_source(relative, &source);
            debug!(path = %relative.display(), buttons = found, "Scanned file");
            report.absorb(found, findings);
        }

        Ok(report)
    }

    /// Audit one file's text. Returns the number of buttons seen and the
    /// findings for those with issues.
    pub fn scan_source(&self, file: &Path, source: &str) -> (usize, Vec<ButtonFinding>) {
        let mut found = 0;
        let mut findings = Vec::new();

        for caps in self.open_tag.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Some(tag_end) = find_tag_end(source, whole.end()) else {
                continue;
            };
            found += 1;

            let tag = &source[whole.start()..tag_end];
            let attributes = &source[whole.end()..tag_end - 1];
            let self_closing = attributes.trim_end().ends_with('/');
            let content = if self_closing {
                ""
            } else {
                element_content(source, tag_end, name.as_str())
            };

            let issues = self.classify(attributes, content, self_closing);
            if issues.is_empty() {
                continue;
            }

            let (line, column) = position(source, whole.start());
            findings.push(ButtonFinding {
                file: file.to_path_buf(),
                line,
                column,
                snippet: snippet(tag),
                issues,
            });
        }

        (found, findings)
    }

    fn classify(&self, attributes: &str, content: &str, self_closing: bool) -> Vec<IssueKind> {
        let mut issues = Vec::new();

        let has_action =
            self.handler.is_match(attributes) || self.submit_type.is_match(attributes);
        if !has_action {
            issues.push(IssueKind::MissingHandler);
        }

        if (self_closing || !has_visible_text(content)) && !self.label.is_match(attributes) {
            issues.push(IssueKind::MissingAccessibleLabel);
        }

        if self.empty_handler.is_match(attributes) {
            issues.push(IssueKind::EmptyHandler);
        }

        issues
    }
}

fn has_scanned_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCANNED_EXTENSIONS.contains(&ext))
}

/// Byte index just past the `>` closing the tag that starts before `from`.
/// Braces and quotes are tracked so `=>` inside `{...}` does not end the tag.
fn find_tag_end(source: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (offset, ch) in source[from..].char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '>' if depth == 0 => return Some(from + offset + 1),
            _ => {}
        }
    }
    None
}

/// Text between the opening tag and the matching `</name>`, or the rest of
/// the file when the close tag is missing.
fn element_content<'a>(source: &'a str, from: usize, name: &str) -> &'a str {
    let rest = &source[from..];
    let close = format!("</{name}");
    match rest.find(&close) {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// True when something other than markup remains: literal text or a `{...}`
/// expression.
fn has_visible_text(content: &str) -> bool {
    let mut in_tag = false;
    for ch in content.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag && !c.is_whitespace() => return true,
            _ => {}
        }
    }
    false
}

fn position(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

fn snippet(tag: &str) -> String {
    let collapsed = tag.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SNIPPET_MAX_CHARS {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(SNIPPET_MAX_CHARS).collect();
    cut.push('…');
    cut
}
