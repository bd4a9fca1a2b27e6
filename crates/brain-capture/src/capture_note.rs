//! Message normalizer: raw RFC 822 bytes to a canonical captured note.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use brain_core::iso_timestamp;
use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use regex::Regex;
use serde::Serialize;

pub const EMAIL_SOURCE: &str = "email";
pub const DEFAULT_SUBJECT: &str = "No subject";
pub const DEFAULT_SENDER: &str = "unknown";

const SLUG_MAX_CHARS: usize = 40;

fn markup_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid markup tag regex"))
}

fn whitespace_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn slug_separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"))
}

/// Canonical note produced from one inbound message. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedNote {
    pub source: String,
    pub subject: String,
    pub sender: String,
    /// Capture time; drives the note's file name.
    pub timestamp: DateTime<Utc>,
    /// Send date from the message headers, or capture time when absent.
    pub date: DateTime<Utc>,
    pub body: String,
}

impl CapturedNote {
    pub fn slug(&self) -> String {
        slugify(&self.subject)
    }

    /// Frontmatter block, a blank line, then the body.
    pub fn render(&self) -> String {
        [
            "---".to_string(),
            format!("source: {}", self.source),
            format!("subject: {}", self.subject),
            format!("sender: {}", self.sender),
            format!("date: {}", iso_timestamp(self.date)),
            "---".to_string(),
            String::new(),
            self.body.clone(),
        ]
        .join("\n")
    }
}

/// Lower-cases, collapses non-alphanumeric runs to `-`, and keeps the first 40 characters.
pub fn slugify(subject: &str) -> String {
    let lowered = subject.to_lowercase();
    slug_separator_pattern()
        .replace_all(&lowered, "-")
        .chars()
        .take(SLUG_MAX_CHARS)
        .collect()
}

pub fn strip_markup(html: &str) -> String {
    let without_tags = markup_tag_pattern().replace_all(html, "");
    whitespace_run_pattern()
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

/// Parses `raw` into a note tagged with `source`, stamped `captured_at`.
pub fn normalize(raw: &[u8], source: &str, captured_at: DateTime<Utc>) -> Result<CapturedNote> {
    let parsed = mailparse::parse_mail(raw).context("failed to parse inbound message")?;
    let headers = parsed.get_headers();

    let subject = non_empty_header(headers.get_first_value("Subject"))
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
    let sender = non_empty_header(headers.get_first_value("From"))
        .unwrap_or_else(|| DEFAULT_SENDER.to_string());
    let date = headers
        .get_first_value("Date")
        .and_then(|value| mailparse::dateparse(&value).ok())
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
        .unwrap_or(captured_at);

    let plain = first_body_of_type(&parsed, "text/plain")?.unwrap_or_default();
    let body = if plain.trim().is_empty() {
        first_body_of_type(&parsed, "text/html")?
            .map(|html| strip_markup(&html))
            .unwrap_or_default()
    } else {
        plain
    };

    Ok(CapturedNote {
        source: source.to_string(),
        subject,
        sender,
        timestamp: captured_at,
        date,
        body,
    })
}

fn non_empty_header(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Depth-first search for the first inline part with the given MIME type.
fn first_body_of_type(part: &ParsedMail<'_>, mimetype: &str) -> Result<Option<String>> {
    if part.subparts.is_empty() {
        let is_attachment =
            part.get_content_disposition().disposition == DispositionType::Attachment;
        if part.ctype.mimetype.eq_ignore_ascii_case(mimetype) && !is_attachment {
            let body = part
                .get_body()
                .with_context(|| format!("failed to decode {mimetype} part"))?;
            return Ok(Some(body));
        }
        return Ok(None);
    }
    for subpart in &part.subparts {
        if let Some(body) = first_body_of_type(subpart, mimetype)? {
            return Ok(Some(body));
        }
    }
    Ok(None)
}
