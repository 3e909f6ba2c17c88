/// Drops trailing parenthesized groups that repeat the text in front of them.
///
/// KOPIS often reports `"Hall (Room) (Hall (Room))"`; this returns `"Hall (Room)"`.
/// Already-clean names are returned unchanged (after whitespace collapsing).
pub fn clean_venue(raw: &str) -> String {
    let mut venue = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    while let Some((prefix, inner)) = split_trailing_group(&venue) {
        if prefix != inner {
            break;
        }
        venue = prefix.to_string();
    }
    venue
}

/// Splits `"prefix (inner)"` at the parenthesis matching the final `)`.
fn split_trailing_group(s: &str) -> Option<(&str, &str)> {
    if !s.ends_with(')') {
        return None;
    }
    let mut depth = 0usize;
    for (idx, ch) in s.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let prefix = s[..idx].trim_end();
                    let inner = s[idx + 1..s.len() - 1].trim();
                    return Some((prefix, inner));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::clean_venue;

    #[test]
    fn removes_duplicated_group() {
        assert_eq!(clean_venue("A (B) (A (B))"), "A (B)");
        assert_eq!(
            clean_venue("올림픽공원 (KSPO DOME) (올림픽공원 (KSPO DOME))"),
            "올림픽공원 (KSPO DOME)"
        );
    }

    #[test]
    fn clean_input_is_a_no_op() {
        assert_eq!(clean_venue("A (B)"), "A (B)");
        assert_eq!(clean_venue("블루스퀘어"), "블루스퀘어");
        assert_eq!(clean_venue(&clean_venue("A (B) (A (B))")), "A (B)");
    }

    #[test]
    fn collapses_whitespace_and_tolerates_unbalanced_input() {
        assert_eq!(clean_venue("  예스24   라이브홀 "), "예스24 라이브홀");
        assert_eq!(clean_venue("A B)"), "A B)");
    }
}
