//! Conflict naming for preserved local edits
//!
//! Conflict copies are titled `"{title} (conflict)"`, then
//! `"{title} (conflict 2)"`, `"{title} (conflict 3)"` and so on while the
//! candidate is already taken under the same parent.

use uuid::Uuid;

const MAX_NUMBERED: u32 = 99;

/// Generates titles for conflict copies
pub struct ConflictNamer;

impl ConflictNamer {
    /// First-choice title for a copy of `title`
    pub fn generate(title: &str) -> String {
        Self::numbered(title, 1)
    }

    fn numbered(title: &str, n: u32) -> String {
        let title = if title.trim().is_empty() {
            "Untitled"
        } else {
            title
        };
        if n <= 1 {
            format!("{title} (conflict)")
        } else {
            format!("{title} (conflict {n})")
        }
    }

    /// Candidate titles in preference order
    ///
    /// Ends with a title carrying a random suffix, so callers probing for a
    /// free title always terminate.
    pub fn candidates(title: &str) -> impl Iterator<Item = String> + '_ {
        (1..=MAX_NUMBERED)
            .map(move |n| Self::numbered(title, n))
            .chain(std::iter::once_with(move || {
                let short = Uuid::new_v4().simple().to_string();
                format!("{} {}", Self::generate(title), &short[..8])
            }))
    }

    /// First candidate for which `exists` returns false
    pub fn generate_unique<F>(title: &str, mut exists: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        let mut last = Self::generate(title);
        for candidate in Self::candidates(title) {
            if !exists(&candidate) {
                return candidate;
            }
            last = candidate;
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        assert_eq!(ConflictNamer::generate("N1"), "N1 (conflict)");
        assert_eq!(ConflictNamer::generate("  "), "Untitled (conflict)");
    }

    #[test]
    fn test_generate_unique_no_collision() {
        assert_eq!(
            ConflictNamer::generate_unique("N1", |_| false),
            "N1 (conflict)"
        );
    }

    #[test]
    fn test_generate_unique_numbers_collisions() {
        let taken = ["N1 (conflict)", "N1 (conflict 2)"];
        let name = ConflictNamer::generate_unique("N1", |c| taken.contains(&c));
        assert_eq!(name, "N1 (conflict 3)");
    }

    #[test]
    fn test_candidates_end_with_random_suffix() {
        let all: Vec<_> = ConflictNamer::candidates("N1").collect();
        assert_eq!(all.len(), MAX_NUMBERED as usize + 1);
        let last = all.last().unwrap();
        assert!(last.starts_with("N1 (conflict) "));
        assert_eq!(last.len(), "N1 (conflict) ".len() + 8);
    }
}
