//! Markdown rendering of a [`ReviewDigest`].
//!
//! The document has a summary table followed by three sections: items due
//! now, items coming up inside the look-ahead window and the mistakes that
//! keep recurring. Empty sections say so instead of rendering an empty table.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use retake_engine::QuestionKind;

use crate::{MistakeSummary, ReviewDigest, ScheduledItem};

/// Longest mistake context shown in the recurring-mistakes table.
const MAX_CONTEXT_DISPLAY_LENGTH: usize = 60;

/// Renders a [`ReviewDigest`] as Markdown.
pub struct MarkdownGenerator<'a> {
    digest: &'a ReviewDigest,
}

impl<'a> MarkdownGenerator<'a> {
    /// Wraps a digest.
    #[must_use]
    pub const fn new(digest: &'a ReviewDigest) -> Self {
        Self { digest }
    }

    /// Renders the whole document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_due(&mut output);
        self.write_upcoming(&mut output);
        self.write_mistakes(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(output, "# Retake Review Digest\n");
        let _ = writeln!(
            output,
            "*Generated {}*\n",
            format_timestamp(&self.digest.generated_at)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let digest = self.digest;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Tracked items | {} |", digest.tracked_items);
        let _ = writeln!(output, "| Due now | {} |", digest.due.len());
        let _ = writeln!(
            output,
            "| Upcoming ({}) | {} |",
            plural(i64::from(digest.upcoming_days), "day"),
            digest.upcoming.len()
        );
        let _ = writeln!(output, "| Mastered | {} |", digest.mastered);
        let _ = writeln!(
            output,
            "| Daily streak | {} |",
            plural(i64::from(digest.streak.current), "day")
        );
        let _ = writeln!(output);
    }

    fn write_due(&self, output: &mut String) {
        let _ = writeln!(output, "## Due Now\n");
        if self.digest.due.is_empty() {
            let _ = writeln!(output, "*Nothing is due.*\n");
            return;
        }
        write_schedule_table(output, &self.digest.due);
    }

    fn write_upcoming(&self, output: &mut String) {
        let _ = writeln!(output, "## Upcoming\n");
        if self.digest.upcoming.is_empty() {
            let _ = writeln!(
                output,
                "*Nothing due in the next {}.*\n",
                plural(i64::from(self.digest.upcoming_days), "day")
            );
            return;
        }
        write_schedule_table(output, &self.digest.upcoming);
    }

    fn write_mistakes(&self, output: &mut String) {
        let _ = writeln!(output, "## Recurring Mistakes\n");
        if self.digest.top_mistakes.is_empty() {
            let _ = writeln!(output, "*No unresolved mistakes.*\n");
            return;
        }

        let _ = writeln!(output, "| Item | Kind | Mistake | Times | Last Seen |");
        let _ = writeln!(output, "|------|------|---------|-------|-----------|");
        for mistake in &self.digest.top_mistakes {
            write_mistake_row(output, mistake);
        }
        let _ = writeln!(output);
    }
}

fn write_schedule_table(output: &mut String, items: &[ScheduledItem]) {
    let _ = writeln!(output, "| Item | Interval | Due | Streak |");
    let _ = writeln!(output, "|------|----------|-----|--------|");
    for item in items {
        let interval = item
            .interval()
            .map_or_else(|| plural(i64::from(item.interval_days), "day"), |i| i.to_string());
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            escape_markdown(&item.item_id),
            interval,
            format_due(item.days_until_due),
            item.streak
        );
    }
    let _ = writeln!(output);
}

fn write_mistake_row(output: &mut String, mistake: &MistakeSummary) {
    let _ = writeln!(
        output,
        "| {} | {} | {} | {} | {} |",
        escape_markdown(&mistake.item_id),
        kind_label(mistake.question_kind),
        escape_markdown(&truncate(&mistake.context, MAX_CONTEXT_DISPLAY_LENGTH)),
        mistake.failure_count,
        mistake.last_seen_at.format("%Y-%m-%d")
    );
}

// ============================================================================
// Helper Functions
// ============================================================================

/// "YYYY-MM-DD HH:MM UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Human wording for a signed day offset.
fn format_due(days_until_due: i64) -> String {
    match days_until_due {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        d if d < 0 => format!("{} overdue", plural(-d, "day")),
        d => format!("in {}", plural(d, "day")),
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

const fn kind_label(kind: QuestionKind) -> &'static str {
    match kind {
        QuestionKind::MultipleChoice => "Multiple choice",
        QuestionKind::FillIn => "Fill in",
        QuestionKind::Reorder => "Reorder",
        QuestionKind::TrueFalse => "True/false",
        QuestionKind::CodeEdit => "Code edit",
        QuestionKind::Narrative => "Narrative",
    }
}

/// Cuts `text` to its first line and at most `max_chars` characters.
fn truncate(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

/// Escapes characters that would break inline Markdown or a table cell.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }
    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use retake_engine::{EngineState, ReportConfig};

    use super::*;
    use crate::tests::{at, sample_digest};

    #[test]
    fn test_full_document() {
        let markdown = MarkdownGenerator::new(&sample_digest()).generate();

        insta::assert_snapshot!(markdown, @r###"
        # Retake Review Digest

        *Generated 2026-06-10 12:00 UTC*

        ## Summary

        | Metric | Value |
        |--------|-------|
        | Tracked items | 3 |
        | Due now | 1 |
        | Upcoming (7 days) | 1 |
        | Mastered | 1 |
        | Daily streak | 2 days |

        ## Due Now

        | Item | Interval | Due | Streak |
        |------|----------|-----|--------|
        | two-sum | 3 days | 6 days overdue | 1 |

        ## Upcoming

        | Item | Interval | Due | Streak |
        |------|----------|-----|--------|
        | lru-cache | 1 day | today | 0 |

        ## Recurring Mistakes

        | Item | Kind | Mistake | Times | Last Seen |
        |------|------|---------|-------|-----------|
        | lru-cache | Fill in | move node to head on get | 2 | 2026-06-10 |
        | two-sum | Multiple choice | picked the O(n^2) scan | 1 | 2026-06-01 |
        "###);
    }

    #[test]
    fn test_empty_sections() {
        let digest = ReviewDigest::from_state(
            &EngineState::new(),
            at("2026-06-10T12:00:00Z"),
            &ReportConfig {
                upcoming_days: 1,
                top_mistakes: 5,
            },
        );
        let markdown = MarkdownGenerator::new(&digest).generate();

        assert!(markdown.contains("*Nothing is due.*"));
        assert!(markdown.contains("*Nothing due in the next 1 day.*"));
        assert!(markdown.contains("*No unresolved mistakes.*"));
        assert!(markdown.contains("| Daily streak | 0 days |"));
    }

    #[test]
    fn test_table_cells_are_escaped() {
        let mut digest = sample_digest();
        digest.top_mistakes[0].context = "used a|b instead of *a".to_string();
        let markdown = MarkdownGenerator::new(&digest).generate();

        assert!(markdown.contains(r"used a\|b instead of \*a"));
    }

    #[test]
    fn test_format_due() {
        assert_eq!(format_due(-1), "1 day overdue");
        assert_eq!(format_due(-3), "3 days overdue");
        assert_eq!(format_due(0), "today");
        assert_eq!(format_due(1), "tomorrow");
        assert_eq!(format_due(12), "in 12 days");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("first\nsecond", 10), "first");
        assert_eq!(truncate("ααααα", 3), "ααα...");
    }
}
