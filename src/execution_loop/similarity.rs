//! Similarity search over catalog names
//!
//! Used by the repair strategies to map an identifier the engine rejected
//! onto a name the catalog knows. Never returns a name outside the
//! candidate list.

use strsim::jaro_winkler;

/// Column name variations seen in practice. A rejected name in a group maps
/// to the first catalog column (in candidate order) from the same group.
const COLUMN_SYNONYMS: &[&[&str]] = &[
    &["score", "marks", "grade", "points", "rating"],
    &["name", "full_name", "student_name", "person_name"],
    &["age", "student_age", "years", "age_group"],
    &["id", "student_id", "user_id", "identifier", "pk"],
    &["date", "created_date", "timestamp", "time", "created_at"],
    &["department", "dept", "faculty", "division", "college"],
    &["email", "email_address", "mail", "contact_email"],
];

const TABLE_SYNONYMS: &[&[&str]] = &[
    &["student", "students", "pupils", "learners"],
    &["course", "courses", "subjects", "classes"],
    &["enrollment", "enrollments", "registrations", "signups"],
    &["instructor", "instructors", "teachers", "professors", "staff"],
    &["department", "departments", "depts", "faculties"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Table,
    Column,
}

/// Matcher for rejected identifiers
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    /// Minimum prefix+suffix ratio, exclusive
    pub threshold: f64,
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self { threshold: 0.6 }
    }
}

impl SimilarityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Shared prefix plus shared suffix over the longer length, case-folded.
    pub fn ratio(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.to_lowercase().chars().collect();
        let b: Vec<char> = b.to_lowercase().chars().collect();
        if a == b {
            return 1.0;
        }

        let max_len = a.len().max(b.len());
        let min_len = a.len().min(b.len());
        if max_len == 0 {
            return 0.0;
        }

        let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
        let suffix = a
            .iter()
            .rev()
            .zip(b.iter().rev())
            .take_while(|(x, y)| x == y)
            .count();

        (prefix + suffix).min(min_len) as f64 / max_len as f64
    }

    /// Closest candidate for `invalid`: exact case-insensitive match, then
    /// substring containment either way, then the best ratio above the
    /// threshold. Ties go to the higher Jaro-Winkler score, then to the
    /// earlier candidate.
    pub fn closest<'a>(&self, invalid: &str, candidates: &[&'a str]) -> Option<&'a str> {
        let needle = invalid.to_lowercase();
        if needle.is_empty() {
            return None;
        }

        if let Some(exact) = candidates
            .iter()
            .copied()
            .find(|c| c.eq_ignore_ascii_case(invalid))
        {
            return Some(exact);
        }

        let containing: Vec<&'a str> = candidates
            .iter()
            .copied()
            .filter(|c| {
                let candidate = c.to_lowercase();
                !candidate.is_empty() && (candidate.contains(&needle) || needle.contains(&candidate))
            })
            .collect();
        if !containing.is_empty() {
            return best_by(&containing, |c| jaro_winkler(&needle, &c.to_lowercase()));
        }

        let scored: Vec<(&'a str, f64)> = candidates
            .iter()
            .map(|c| (*c, self.ratio(invalid, c)))
            .filter(|(_, ratio)| *ratio > self.threshold)
            .collect();
        let best_ratio = scored.iter().map(|(_, r)| *r).fold(f64::NAN, f64::max);
        let tied: Vec<&'a str> = scored
            .iter()
            .filter(|(_, r)| *r == best_ratio)
            .map(|(c, _)| *c)
            .collect();
        best_by(&tied, |c| jaro_winkler(&needle, &c.to_lowercase()))
    }

    /// Candidate sharing a synonym group with `invalid`, if any.
    pub fn synonym<'a>(
        &self,
        invalid: &str,
        candidates: &[&'a str],
        kind: IdentifierKind,
    ) -> Option<&'a str> {
        let groups = match kind {
            IdentifierKind::Table => TABLE_SYNONYMS,
            IdentifierKind::Column => COLUMN_SYNONYMS,
        };

        groups
            .iter()
            .filter(|group| group.iter().any(|word| word.eq_ignore_ascii_case(invalid)))
            .find_map(|group| {
                candidates.iter().copied().find(|c| {
                    !c.eq_ignore_ascii_case(invalid)
                        && group.iter().any(|word| word.eq_ignore_ascii_case(c))
                })
            })
    }

    /// Synonym lookup first, then similarity search.
    pub fn suggest<'a>(
        &self,
        invalid: &str,
        candidates: &[&'a str],
        kind: IdentifierKind,
    ) -> Option<&'a str> {
        self.synonym(invalid, candidates, kind)
            .or_else(|| self.closest(invalid, candidates))
    }
}

/// Highest-scoring item, first one wins on equal scores.
fn best_by<'a>(items: &[&'a str], score: impl Fn(&str) -> f64) -> Option<&'a str> {
    let mut best: Option<(&'a str, f64)> = None;
    for &item in items {
        let s = score(item);
        match best {
            Some((_, top)) if s <= top => {}
            _ => best = Some((item, s)),
        }
    }
    best.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        let matcher = SimilarityMatcher::default();
        assert_eq!(matcher.ratio("STU_GPA", "stu_gpa"), 1.0);
        // prefix "stu_gp", no shared suffix
        assert!((matcher.ratio("stu_gpx", "stu_gpa") - 6.0 / 7.0).abs() < 1e-9);
        // no shared prefix, suffix "_code" over 9
        assert!((matcher.ratio("stu_code", "dept_code") - 5.0 / 9.0).abs() < 1e-9);
        assert_eq!(matcher.ratio("", "abc"), 0.0);
        assert!(matcher.ratio("aaa", "aaaa") <= 1.0);
    }

    #[test]
    fn test_closest_prefers_exact_then_substring() {
        let matcher = SimilarityMatcher::default();
        let candidates = ["STU_NAME", "STU_FNAME", "FNAME"];
        assert_eq!(matcher.closest("fname", &candidates), Some("FNAME"));
        assert_eq!(matcher.closest("stu_fnam", &candidates), Some("STU_FNAME"));
    }

    #[test]
    fn test_closest_ratio_threshold() {
        let matcher = SimilarityMatcher::default();
        // stu_gpz vs stu_gpa: (6 + 0) / 7 > 0.6
        assert_eq!(matcher.closest("stu_gpz", &["DEPT_CODE", "STU_GPA"]), Some("STU_GPA"));
        assert_eq!(matcher.closest("salary", &["DEPT_CODE", "STU_GPA"]), None);
        assert_eq!(matcher.closest("", &["DEPT_CODE"]), None);
    }

    #[test]
    fn test_synonym_groups() {
        let matcher = SimilarityMatcher::default();
        let columns = ["id", "name", "marks"];
        assert_eq!(
            matcher.synonym("score", &columns, IdentifierKind::Column),
            Some("marks")
        );
        assert_eq!(
            matcher.synonym("pupils", &["COURSE", "STUDENT"], IdentifierKind::Table),
            Some("STUDENT")
        );
        assert_eq!(matcher.synonym("gpa", &columns, IdentifierKind::Column), None);
        assert_eq!(
            matcher.suggest("score", &columns, IdentifierKind::Column),
            Some("marks")
        );
    }
}
