//! The command palette: commands plus every cached book, fuzzy filtered.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Group {
    Commands,
    Books,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// `nav.library`, `book.open:<uuid>`, ...
    pub id: String,
    pub title: String,
    pub group: Group,
    pub enabled: bool,
}
impl Entry {
    pub fn command(id: &str, title: &str, enabled: bool) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            group: Group::Commands,
            enabled,
        }
    }

    pub fn book(id: uuid::Uuid, title: &str) -> Self {
        Self {
            id: format!("book.open:{id}"),
            title: title.to_string(),
            group: Group::Books,
            enabled: true,
        }
    }
}

/// Score `target` against `query`: +10 per matched character, +3 per step
/// of a run of adjacent matches, minus the target length.
///
/// Returns `-1` when `query` is not a subsequence of `target`.
pub fn fuzzy_score(query: &str, target: &str) -> i64 {
    score(query, target).unwrap_or(-1)
}

fn score(query: &str, target: &str) -> Option<i64> {
    let query = query.trim().to_lowercase();
    let target: Vec<char> = target.trim().to_lowercase().chars().collect();
    let mut total = 0_i64;
    let mut streak = 0_i64;
    let mut previous: Option<usize> = None;
    let mut from = 0;
    for wanted in query.chars() {
        let found = from + target.get(from..)?.iter().position(|c| *c == wanted)?;
        streak = if previous.is_some_and(|p| p + 1 == found) { streak + 1 } else { 0 };
        total += 10 + 3 * streak;
        previous = Some(found);
        from = found + 1;
    }
    Some(total - i64::try_from(target.len()).unwrap_or(i64::MAX))
}

/// Entries matching `query`, grouped, then by score, enabled and title.
pub fn filter(entries: &[Entry], query: &str) -> Vec<Entry> {
    let mut scored: Vec<(i64, &Entry)> = entries
        .iter()
        .filter_map(|entry| score(query, &entry.title).map(|score| (score, entry)))
        .collect();
    scored.sort_by(|(a_score, a), (b_score, b)| {
        a.group
            .cmp(&b.group)
            .then_with(|| b_score.cmp(a_score))
            .then_with(|| b.enabled.cmp(&a.enabled))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
    scored.into_iter().map(|(_, entry)| entry.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "abc", -3)]
    #[case("abc", "abc", 10 + 13 + 16 - 3)]
    #[case("ac", "abc", 20 - 3)]
    #[case("  AB ", "abc", 10 + 13 - 3)]
    #[case("cb", "abc", -1)]
    #[case("x", "abc", -1)]
    fn test_fuzzy_score(#[case] query: &str, #[case] target: &str, #[case] expected: i64) {
        assert_eq!(fuzzy_score(query, target), expected);
    }

    #[test]
    fn test_contiguous_beats_scattered() {
        assert!(fuzzy_score("lib", "library refresh") > fuzzy_score("lib", "log in bootstrap"));
    }

    #[test]
    fn test_filter_orders_and_hides() {
        let entries = vec![
            Entry::book(uuid::Uuid::nil(), "Sync Notes"),
            Entry::command("sync.now", "Sync now", true),
            Entry::command("community.borrow", "Sync borrow", false),
            Entry::command("app.quit", "Quit", true),
        ];
        let ids: Vec<_> = filter(&entries, "sync").into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["sync.now", "community.borrow", "book.open:00000000-0000-0000-0000-000000000000"]);
        assert_eq!(filter(&entries, "").len(), 4);
    }

    #[test]
    fn test_ties_prefer_enabled_then_title() {
        let entries = vec![
            Entry::command("b", "Beta", true),
            Entry::command("a", "Alfa", false),
            Entry::command("c", "Acme", true),
        ];
        let ids: Vec<_> = filter(&entries, "").into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }
}
