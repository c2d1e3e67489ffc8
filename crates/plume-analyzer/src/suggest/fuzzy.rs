/// Scores `label` against the user's partial word.
///
/// `None` means the label is dropped from the suggestion list. The score is
/// used only for filtering; ordering is decided by priority and usage.
pub fn fuzzy_score(label: &str, partial: &str) -> Option<i32> {
    let label_folded = label.to_lowercase();
    let partial_folded = partial.to_lowercase();

    if partial_folded.is_empty() {
        // Everything is a prefix of the empty word.
        return Some(prefix_score(label, partial));
    }
    if label_folded == partial_folded {
        return Some(100);
    }
    if label_folded.starts_with(&partial_folded) {
        return Some(prefix_score(label, partial));
    }
    if label_folded.contains(&partial_folded) {
        return Some(70);
    }

    // Subsequence: all partial characters appear in order.
    let mut label_chars = label_folded.chars();
    let mut matched = 0;
    for wanted in partial_folded.chars() {
        if !label_chars.any(|c| c == wanted) {
            return None;
        }
        matched += 1;
    }
    Some((60 + 5 * matched).min(80))
}

fn prefix_score(label: &str, partial: &str) -> i32 {
    let surplus = label.chars().count() as i32 - partial.chars().count() as i32;
    (90 - surplus).max(50)
}
