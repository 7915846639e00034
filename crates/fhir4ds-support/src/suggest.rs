//! Nearest-name suggestions for unknown functions/elements, replacing the
//! Python source's `difflib.get_close_matches` with a small Levenshtein
//! implementation (spec §4.3 rule 8/10, "up to three edit-distance
//! suggestions").

/// Levenshtein edit distance between two strings, case-insensitive.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let (n, m) = (a.len(), b.len());

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

/// Similarity ratio in `[0.0, 1.0]`, matching `difflib`'s rough notion of
/// "closeness" well enough for suggestion purposes: `1 - distance / max_len`.
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (edit_distance(a, b) as f64 / max_len as f64)
}

/// Return up to `limit` candidates from `pool` whose similarity to `target`
/// is at least `cutoff`, ordered best-first (ties broken by input order).
pub fn close_matches<'a>(
    target: &str,
    pool: impl IntoIterator<Item = &'a str>,
    limit: usize,
    cutoff: f64,
) -> Vec<&'a str> {
    let mut scored: Vec<(f64, &str)> = pool
        .into_iter()
        .map(|candidate| (similarity(target, candidate), candidate))
        .filter(|(score, _)| *score >= cutoff)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(limit).map(|(_, name)| name).collect()
}

/// Convenience wrapper returning just the single best suggestion, matching
/// the validator's `_suggest_function` use of `difflib.get_close_matches(..., n=1, cutoff=0.6)`.
pub fn best_match<'a>(target: &str, pool: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    close_matches(target, pool, 1, 0.6).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_close_function_name() {
        let pool = ["where", "select", "exists", "count"];
        assert_eq!(best_match("wher", pool), Some("where"));
    }

    #[test]
    fn returns_none_when_nothing_close() {
        let pool = ["where", "select"];
        assert_eq!(best_match("zzzzzzzzzz", pool), None);
    }

    #[test]
    fn close_matches_respects_limit_and_order() {
        let pool = ["given", "gives", "giveup", "count"];
        let matches = close_matches("give", pool, 3, 0.3);
        assert!(matches.len() <= 3);
        assert!(matches.contains(&"given"));
        assert!(!matches.contains(&"count"));
    }
}
