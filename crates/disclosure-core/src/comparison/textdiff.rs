//! Coarse text diffing (§4.10): a Ratcliff/Obershelp match ratio plus
//! line-level deltas, used only for summary statistics alongside the
//! per-section LLM analysis, never as a substitute for it.

use crate::model::TextDifferences;
use similar::{ChangeTag, TextDiff};

pub fn diff_text(before: &str, after: &str) -> TextDifferences {
    let diff = TextDiff::from_lines(before, after);

    let mut added_text = Vec::new();
    let mut removed_text = Vec::new();
    let mut changed_text = Vec::new();

    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches('\n').to_string();
        if line.is_empty() {
            continue;
        }
        match change.tag() {
            ChangeTag::Insert => added_text.push(line),
            ChangeTag::Delete => removed_text.push(line),
            ChangeTag::Equal => {}
        }
    }
    // Lines present as both a deletion and an insertion at the same
    // position read as modifications rather than pure adds/removes.
    let common_len = added_text.len().min(removed_text.len());
    for i in 0..common_len {
        changed_text.push(format!("{} -> {}", removed_text[i], added_text[i]));
    }

    TextDifferences {
        added_text,
        removed_text,
        changed_text,
        match_ratio: diff.ratio(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_ratio_one() {
        let result = diff_text("same\ntext\n", "same\ntext\n");
        assert!((result.match_ratio - 1.0).abs() < 1e-6);
        assert!(result.added_text.is_empty());
        assert!(result.removed_text.is_empty());
    }

    #[test]
    fn wholly_different_text_has_low_ratio() {
        let result = diff_text("alpha\nbeta\n", "gamma\ndelta\n");
        assert!(result.match_ratio < 0.5);
        assert_eq!(result.added_text.len(), 2);
        assert_eq!(result.removed_text.len(), 2);
    }

    #[test]
    fn partial_overlap_records_additions_and_removals() {
        let result = diff_text("line one\nline two\nline three\n", "line one\nline three\nline four\n");
        assert!(result.removed_text.contains(&"line two".to_string()));
        assert!(result.added_text.contains(&"line four".to_string()));
    }
}
