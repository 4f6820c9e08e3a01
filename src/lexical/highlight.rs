//! Highlight snippet assembly from stored term positions (spec.md §4.6
//! step 9: "compute highlights (snippets from searchable fields using the
//! analyzer's term positions, wrapping hits in highlightPreTag/PostTag)").

/// Builds a highlighted snippet for `text` given the `(start, end)` byte
/// offsets of matching tokens, wrapping each hit in `pre`/`post` tags.
/// Offsets are assumed sorted and non-overlapping.
pub fn build_snippet(text: &str, hit_offsets: &[(usize, usize)], pre: &str, post: &str) -> String {
    if hit_offsets.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let mut cursor = 0usize;
    for &(start, end) in hit_offsets {
        if start < cursor || end > text.len() || start > end {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push_str(pre);
        out.push_str(&text[start..end]);
        out.push_str(post);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_single_hit() {
        let snippet = build_snippet("the quick fox", &[(4, 9)], "<em>", "</em>");
        assert_eq!(snippet, "the <em>quick</em> fox");
    }

    #[test]
    fn wraps_multiple_hits_in_order() {
        let snippet = build_snippet("a b c", &[(0, 1), (4, 5)], "[", "]");
        assert_eq!(snippet, "[a] b [c]");
    }
}
