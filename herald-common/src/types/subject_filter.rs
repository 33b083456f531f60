// Subject filter: a list of glob patterns over slash-separated
// subject paths. `*` matches exactly one segment; `**` matches the rest of
// the subject (zero or more remaining segments).

#[derive(Debug, Clone)]
pub struct SubjectFilter {
    patterns: Vec<String>,
}

impl SubjectFilter {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn everything() -> Self {
        Self::new(["**"])
    }

    /// True if any pattern in this filter matches `subject`.
    pub fn matches(&self, subject: &str) -> bool {
        self.patterns.iter().any(|p| pattern_matches(p, subject))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn pattern_matches(pattern: &str, subject: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split('/').collect();
    let subject_segs: Vec<&str> = subject.split('/').collect();
    match_segs(&pattern_segs, &subject_segs)
}

fn match_segs(pattern: &[&str], subject: &[&str]) -> bool {
    match pattern.first() {
        None => subject.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            // Try consuming 0..=subject.len() segments under the `**`.
            (0..=subject.len()).any(|n| match_segs(&pattern[1..], &subject[n..]))
        }
        Some(&"*") => {
            !subject.is_empty() && match_segs(&pattern[1..], &subject[1..])
        }
        Some(seg) => {
            !subject.is_empty() && subject[0] == *seg && match_segs(&pattern[1..], &subject[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let f = SubjectFilter::new(["herald/directory/discovery/step1"]);
        assert!(f.matches("herald/directory/discovery/step1"));
        assert!(!f.matches("herald/directory/discovery/step2"));
    }

    #[test]
    fn single_star_matches_one_segment() {
        let f = SubjectFilter::new(["herald/routing/reply/*"]);
        assert!(f.matches("herald/routing/reply/R"));
        assert!(f.matches("herald/routing/reply/N"));
        assert!(!f.matches("herald/routing/reply"));
        assert!(!f.matches("herald/routing/reply/R/extra"));
    }

    #[test]
    fn double_star_matches_rest() {
        let f = SubjectFilter::new(["herald/rpc/**"]);
        assert!(f.matches("herald/rpc/xmlrpc"));
        assert!(f.matches("herald/rpc/discovery/contact"));
        assert!(f.matches("herald/rpc"));
        assert!(!f.matches("herald/routing/hello/"));
    }

    #[test]
    fn everything_matches_any_subject() {
        let f = SubjectFilter::everything();
        assert!(f.matches("anything/goes/here"));
        assert!(f.matches(""));
    }
}
