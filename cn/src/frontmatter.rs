//! Document header parsing and generation
//!
//! Every generated document carries a `---` delimited YAML header with at
//! least `status` and `doc_type`. The header is the single source of
//! truth for publishing readiness: a missing or unparseable header means
//! the document is a draft and never leaves the machine.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use queuestore::DocStatus;

/// Header statuses that allow a document to sync to the remote target.
const READY_STATUSES: &[&str] = &["published", "complete"];

/// Parsed document header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frontmatter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Frontmatter {
    /// The lifecycle status this header maps to. `complete` counts as
    /// published; anything absent or unknown is a draft.
    pub fn doc_status(&self) -> DocStatus {
        match self.status.as_deref() {
            Some("complete") => DocStatus::Published,
            Some(s) => s.parse().unwrap_or_default(),
            None => DocStatus::Draft,
        }
    }
}

/// Whether the content begins with a header block.
pub fn has_frontmatter(content: &str) -> bool {
    content.trim_start().starts_with("---")
}

/// Split content into its header and body.
///
/// Missing, unterminated or unparseable headers yield a default
/// (draft) header and leave the content untouched as the body.
pub fn parse(content: &str) -> (Frontmatter, String) {
    if !has_frontmatter(content) {
        return (Frontmatter::default(), content.to_string());
    }

    let trimmed = content.trim_start();
    let after_open = &trimmed[3..];
    let Some((header, body)) = after_open.split_once("\n---") else {
        return (Frontmatter::default(), content.to_string());
    };

    let frontmatter: Frontmatter = serde_yaml::from_str(header).unwrap_or_default();
    (frontmatter, body.trim_start_matches('-').trim_start().to_string())
}

/// Render a header block followed by the body.
pub fn render(frontmatter: &Frontmatter, body: &str) -> String {
    let yaml = serde_yaml::to_string(frontmatter).unwrap_or_default();
    format!("---\n{}---\n\n{}", yaml, body)
}

/// Publishing gate: true iff the header status marks the document done.
pub fn is_ready_for_sync(content: &str) -> bool {
    let (frontmatter, _) = parse(content);
    frontmatter
        .status
        .as_deref()
        .is_some_and(|s| READY_STATUSES.contains(&s.to_lowercase().as_str()))
}

/// Lifecycle status recorded in the content's header.
pub fn document_status(content: &str) -> DocStatus {
    parse(content).0.doc_status()
}

/// Prepend a header to content that has none.
///
/// Content that already carries a header is returned unchanged. The
/// status defaults to `in_progress` for AI-processed content and `draft`
/// otherwise.
pub fn add_frontmatter(content: &str, filename: &str, status: Option<&str>, ai_processed: bool) -> String {
    if has_frontmatter(content) {
        return content.to_string();
    }

    let status = status
        .map(str::to_string)
        .unwrap_or_else(|| if ai_processed { "in_progress" } else { "draft" }.to_string());

    let frontmatter = Frontmatter {
        title: Some(title_from_filename(filename)),
        doc_type: Some(detect_type(filename).to_string()),
        status: Some(status),
        date: extract_date_from_filename(filename)
            .or_else(|| Some(Utc::now().date_naive().to_string())),
        ..Default::default()
    };
    render(&frontmatter, content)
}

/// Rewrite the header status in place, preserving everything else.
pub fn promote_status(content: &str, status: &str) -> String {
    let (mut frontmatter, body) = parse(content);
    frontmatter.status = Some(status.to_string());
    render(&frontmatter, &body)
}

/// Document type inferred from a file name.
pub fn detect_type(filename: &str) -> &'static str {
    let name = filename.to_lowercase();
    if name.contains("journal_") {
        "journal"
    } else if name.contains("premarket_") || name.contains("pre_market_") {
        "premarket"
    } else if name.contains("research_") {
        "research"
    } else if name.contains("insight") {
        "insights"
    } else if name.contains("chart_") {
        "charts"
    } else if name.contains("weekly_")
        || name.contains("monthly_")
        || name.contains("yearly_")
        || name.contains("rundown_")
        || name.contains("report")
    {
        "reports"
    } else {
        "notes"
    }
}

/// First `YYYY-MM-DD` sequence in a file name, if any.
pub fn extract_date_from_filename(filename: &str) -> Option<String> {
    let bytes = filename.as_bytes();
    for start in 0..bytes.len().saturating_sub(9) {
        let window = &bytes[start..start + 10];
        let is_date = window.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
        if is_date {
            return Some(filename[start..start + 10].to_string());
        }
    }
    None
}

fn title_from_filename(filename: &str) -> String {
    filename
        .trim_end_matches(".md")
        .replace('_', " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\ntitle: Daily Journal\ndoc_type: journal\nstatus: published\ndate: 2026-08-01\ntags:\n- gold\n- silver\n---\n\n# Market Journal\n\nBody text.\n";

    #[test]
    fn test_parse_full_header() {
        let (fm, body) = parse(DOC);
        assert_eq!(fm.title.as_deref(), Some("Daily Journal"));
        assert_eq!(fm.doc_type.as_deref(), Some("journal"));
        assert_eq!(fm.status.as_deref(), Some("published"));
        assert_eq!(fm.tags, vec!["gold", "silver"]);
        assert!(body.starts_with("# Market Journal"));
    }

    #[test]
    fn test_parse_missing_header_is_draft() {
        let (fm, body) = parse("# Just a body\n");
        assert_eq!(fm, Frontmatter::default());
        assert_eq!(fm.doc_status(), DocStatus::Draft);
        assert_eq!(body, "# Just a body\n");
    }

    #[test]
    fn test_parse_unterminated_header_is_draft() {
        let content = "---\nstatus: published\nno closing delimiter";
        let (fm, _) = parse(content);
        assert_eq!(fm.status, None);
        assert!(!is_ready_for_sync(content));
    }

    #[test]
    fn test_ready_for_sync_statuses() {
        assert!(is_ready_for_sync("---\nstatus: published\n---\nbody"));
        assert!(is_ready_for_sync("---\nstatus: complete\n---\nbody"));
        assert!(!is_ready_for_sync("---\nstatus: draft\n---\nbody"));
        assert!(!is_ready_for_sync("---\nstatus: in_progress\n---\nbody"));
        assert!(!is_ready_for_sync("no header at all"));
    }

    #[test]
    fn test_document_status_maps_complete_to_published() {
        assert_eq!(document_status("---\nstatus: complete\n---\nx"), DocStatus::Published);
        assert_eq!(document_status("---\nstatus: review\n---\nx"), DocStatus::Review);
        assert_eq!(document_status("---\nstatus: nonsense\n---\nx"), DocStatus::Draft);
    }

    #[test]
    fn test_add_frontmatter_is_idempotent() {
        let once = add_frontmatter("body\n", "journal_2026-08-01.md", None, false);
        let twice = add_frontmatter(&once, "journal_2026-08-01.md", None, false);
        assert_eq!(once, twice);

        let (fm, body) = parse(&once);
        assert_eq!(fm.status.as_deref(), Some("draft"));
        assert_eq!(fm.doc_type.as_deref(), Some("journal"));
        assert_eq!(fm.date.as_deref(), Some("2026-08-01"));
        assert_eq!(body, "body\n");
    }

    #[test]
    fn test_add_frontmatter_ai_processed_is_in_progress() {
        let content = add_frontmatter("body", "weekly_report_2026-08-01.md", None, true);
        let (fm, _) = parse(&content);
        assert_eq!(fm.status.as_deref(), Some("in_progress"));
    }

    #[test]
    fn test_promote_status_round_trip() {
        let content = add_frontmatter("body", "journal_2026-08-01.md", None, true);
        assert!(!is_ready_for_sync(&content));

        let promoted = promote_status(&content, "published");
        assert!(is_ready_for_sync(&promoted));

        // Body and other fields survive.
        let (fm, body) = parse(&promoted);
        assert_eq!(fm.doc_type.as_deref(), Some("journal"));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_detect_type() {
        assert_eq!(detect_type("Journal_2026-08-01.md"), "journal");
        assert_eq!(detect_type("premarket_2026-08-01.md"), "premarket");
        assert_eq!(detect_type("research_ACT-20260801-0001.md"), "research");
        assert_eq!(detect_type("weekly_report_2026-W31.md"), "reports");
        assert_eq!(detect_type("random_notes.md"), "notes");
    }

    #[test]
    fn test_extract_date_from_filename() {
        assert_eq!(
            extract_date_from_filename("journal_2026-08-01.md").as_deref(),
            Some("2026-08-01")
        );
        assert_eq!(extract_date_from_filename("no_date_here.md"), None);
    }
}
