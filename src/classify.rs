use std::collections::{BTreeMap, HashSet};

use crate::models::Issue;

/// Visited-set over issue keys for one rendered document.
///
/// Every rendering pass consults the same checker so an issue that already
/// appeared in an earlier list is suppressed in later ones. The set only
/// grows; construct a fresh checker per document.
#[derive(Debug, Default)]
pub struct RepeatChecker {
    seen: HashSet<String>,
}

impl RepeatChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` was already seen. On first encounter the key
    /// is recorded as a side effect, so callers use the single boolean to
    /// both query and register.
    pub fn check(&mut self, key: &str) -> bool {
        !self.seen.insert(key.to_string())
    }
}

/// Group a flat issue collection by lower-cased type name.
///
/// Stable partition: within each bucket the input order is preserved, no
/// issue is dropped or duplicated, and empty input yields an empty map.
pub fn classify_by_type(issues: Vec<Issue>) -> BTreeMap<String, Vec<Issue>> {
    let mut groups: BTreeMap<String, Vec<Issue>> = BTreeMap::new();
    for issue in issues {
        let key = issue.type_name.to_lowercase();
        groups.entry(key).or_default().push(issue);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IssueType;

    fn issue(key: &str, type_name: &str) -> Issue {
        Issue {
            key: key.to_string(),
            type_name: type_name.to_string(),
            issue_type: IssueType::parse(type_name),
            status: "Open".to_string(),
            summary: format!("summary of {key}"),
            assignee: None,
            due_date: None,
            subtask_keys: Vec::new(),
            worklogs: Vec::new(),
            progress: None,
        }
    }

    #[test]
    fn test_check_registers_on_first_encounter() {
        let mut checker = RepeatChecker::new();
        assert!(!checker.check("T-1"));
        assert!(checker.check("T-1"));
        assert!(checker.check("T-1"));
    }

    #[test]
    fn test_check_keys_are_independent() {
        let mut checker = RepeatChecker::new();
        assert!(!checker.check("T-1"));
        assert!(!checker.check("T-2"));
        assert!(checker.check("T-1"));
        assert!(!checker.check("T-3"));
        assert!(checker.check("T-2"));
        assert!(checker.check("T-3"));
    }

    #[test]
    fn test_classify_groups_case_insensitively() {
        let groups = classify_by_type(vec![
            issue("T-1", "Epic"),
            issue("T-2", "Task"),
            issue("T-3", "EPIC"),
            issue("T-4", "Bug"),
            issue("T-5", "task"),
        ]);

        assert_eq!(groups.len(), 3);
        let keys: Vec<&str> = groups["epic"].iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["T-1", "T-3"]);
        let keys: Vec<&str> = groups["task"].iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["T-2", "T-5"]);
        assert_eq!(groups["bug"].len(), 1);
    }

    #[test]
    fn test_classify_preserves_every_issue_exactly_once() {
        let input: Vec<Issue> = (0..20)
            .map(|i| issue(&format!("T-{i}"), ["Epic", "Task", "Bug"][i % 3]))
            .collect();
        let total = input.len();

        let groups = classify_by_type(input);

        let count: usize = groups.values().map(Vec::len).sum();
        assert_eq!(count, total);

        let mut all_keys: Vec<&str> = groups
            .values()
            .flat_map(|g| g.iter().map(|i| i.key.as_str()))
            .collect();
        all_keys.sort_unstable();
        all_keys.dedup();
        assert_eq!(all_keys.len(), total);
    }

    #[test]
    fn test_classify_empty_input() {
        let groups = classify_by_type(Vec::new());
        assert!(groups.is_empty());
    }
}
