//! Extraction of bug-related sections from review markdown.
//!
//! A section starts at a `##` or `###` heading named `Bugs`, `Possible Issues` or
//! `Security Issues` and runs until the next line starting with `##`, or the end
//! of the text. Matching is case-sensitive and the hash count is exact, so
//! `#### Bugs` and `## bugs` are ignored.

use std::sync::LazyLock;

use regex::Regex;

pub const BUG_SCAN_HEADER: &str = "# Bug Scan Results";

const NO_FINDINGS: &str = "No critical bugs or issues were identified in the scan.";

static BUG_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{2,3} (?:Bugs|Possible Issues|Security Issues)\b")
        .expect("bug heading pattern is valid")
});

static NEXT_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^##").expect("heading pattern is valid"));

/// Return every bug section in document order, each including its heading line.
pub fn extract_bug_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut cursor = 0;

    while let Some(heading) = BUG_HEADING.find_at(text, cursor) {
        let end = NEXT_HEADING
            .find_at(text, heading.end())
            .map(|next| next.start())
            .unwrap_or(text.len());
        sections.push(&text[heading.start()..end]);
        cursor = end;
    }

    sections
}

/// Render the bug-scan reply for a review.
///
/// Falls back to the whole review, prefixed with a notice, when no bug section exists.
pub fn format_bug_report(review: &str) -> String {
    let sections = extract_bug_sections(review);
    if sections.is_empty() {
        format!(
            "{}\n\n{}\n\nFull review content:\n\n{}",
            BUG_SCAN_HEADER, NO_FINDINGS, review
        )
    } else {
        format!("{}\n\n{}", BUG_SCAN_HEADER, sections.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_ends_at_next_heading() {
        let text = "## Bugs\nOff-by-one in loop.\n## Style\nUse snake_case.";
        assert_eq!(extract_bug_sections(text), vec!["## Bugs\nOff-by-one in loop.\n"]);
    }

    #[test]
    fn test_section_runs_to_end_of_text() {
        let text = "Intro\n### Security Issues\nToken logged in plain text.";
        assert_eq!(
            extract_bug_sections(text),
            vec!["### Security Issues\nToken logged in plain text."]
        );
    }

    #[test]
    fn test_multiple_sections_in_order() {
        let text = "## Summary\nok\n## Possible Issues\nnull deref\n## Tests\nnone\n### Bugs\nleak\n";
        assert_eq!(
            extract_bug_sections(text),
            vec!["## Possible Issues\nnull deref\n", "### Bugs\nleak\n"]
        );
    }

    #[test]
    fn test_hash_count_is_exact() {
        assert!(extract_bug_sections("#### Bugs\nnot a match").is_empty());
        assert!(extract_bug_sections("# Bugs\nnot a match").is_empty());
    }

    #[test]
    fn test_case_sensitive() {
        assert!(extract_bug_sections("## bugs\nlower case").is_empty());
        assert!(extract_bug_sections("## POSSIBLE ISSUES\nupper case").is_empty());
    }

    #[test]
    fn test_heading_must_start_line() {
        assert!(extract_bug_sections("see ## Bugs below").is_empty());
    }

    #[test]
    fn test_heading_word_boundary() {
        assert!(extract_bug_sections("## Bugsy\nnot a heading").is_empty());
        assert_eq!(
            extract_bug_sections("## Bugs found\nnil map"),
            vec!["## Bugs found\nnil map"]
        );
    }

    #[test]
    fn test_deeper_subheading_ends_section() {
        let text = "## Bugs\nfirst\n#### Details\nmore";
        assert_eq!(extract_bug_sections(text), vec!["## Bugs\nfirst\n"]);
    }

    #[test]
    fn test_format_with_sections() {
        let report = format_bug_report("## Bugs\nOff-by-one in loop.\n## Style\nUse snake_case.");
        assert_eq!(report, "# Bug Scan Results\n\n## Bugs\nOff-by-one in loop.\n");
    }

    #[test]
    fn test_format_without_sections() {
        let review = "## Summary\nLooks fine overall.";
        let report = format_bug_report(review);
        assert!(report.starts_with(BUG_SCAN_HEADER));
        assert!(report.contains("No critical bugs"));
        assert!(report.contains("Full review content:"));
        assert!(report.ends_with(review));
    }
}
