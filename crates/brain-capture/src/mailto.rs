use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_FOLLOWUP_SUBJECT: &str = "Follow-up";

const SUGGESTION_PREFIX: &str = "[TODO — suggested: ";

fn subject_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*\*Subject\*\*:[ \t]*(.+)").expect("valid subject regex"))
}

fn draft_heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"## Draft Message\n\n").expect("valid draft heading regex"))
}

fn blockquote_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^>\s*").expect("valid blockquote regex"))
}

/// Builds a `mailto:` link from a generated follow-up draft.
pub fn followup_mailto_link(draft: &str) -> String {
    let subject = subject_pattern()
        .captures(draft)
        .and_then(|captures| captures.get(1))
        .map(|value| {
            value
                .as_str()
                .trim_end_matches('\r')
                .replacen(SUGGESTION_PREFIX, "", 1)
                .replacen(']', "", 1)
        })
        .unwrap_or_else(|| DEFAULT_FOLLOWUP_SUBJECT.to_string());

    format!(
        "mailto:?subject={}&body={}",
        urlencoding::encode(&subject),
        urlencoding::encode(&draft_body(draft))
    )
}

fn draft_body(draft: &str) -> String {
    let Some(heading) = draft_heading_pattern().find(draft) else {
        return String::new();
    };
    let section = &draft[heading.end()..];
    let end = ["\n---", "\n##"]
        .iter()
        .filter_map(|terminator| section.find(terminator))
        .min()
        .unwrap_or(section.len());
    let unquoted = blockquote_pattern().replace_all(&section[..end], "");
    unquoted.replace("**", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAFT: &str = "# Follow-up: Ship thing\n\n\
## Draft Message\n\n\
> **Subject**: [TODO — suggested: Re: Weekly sync]\n\
>\n\
> Hi team, **quick** check on the launch.\n\
\n\
---\n\
Generated notes";

    #[test]
    fn unit_followup_link_extracts_subject_and_body() {
        let link = followup_mailto_link(DRAFT);
        assert!(link.starts_with("mailto:?subject=Re%3A%20Weekly%20sync&body="));
        let body = link.split("&body=").nth(1).expect("body param");
        let decoded = urlencoding::decode(body).expect("decode");
        assert!(decoded.starts_with("Subject: [TODO — suggested: Re: Weekly sync]"));
        assert!(decoded.ends_with("Hi team, quick check on the launch."));
        assert!(!decoded.contains("Generated notes"));
    }

    #[test]
    fn unit_followup_link_defaults_without_subject_or_draft_section() {
        assert_eq!(
            followup_mailto_link("just some notes"),
            "mailto:?subject=Follow-up&body="
        );
    }
}
