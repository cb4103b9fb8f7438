use std::collections::BTreeMap;

use crate::model::ContentTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn error(message: String) -> Self {
        Self {
            severity: Severity::Error,
            message,
        }
    }

    fn warning(message: String) -> Self {
        Self {
            severity: Severity::Warning,
            message,
        }
    }
}

/// Referential/structural integrity checks run before any persistence
/// attempt. Issues are advisory: the author is informed, never stopped,
/// and nothing is auto-fixed.
pub fn check(tree: &ContentTree) -> Vec<Issue> {
    let mut issues = Vec::new();

    // One error per duplicated id value, however many copies exist.
    let mut id_counts: BTreeMap<i64, usize> = BTreeMap::new();
    for project in &tree.projects {
        *id_counts.entry(project.id).or_insert(0) += 1;
    }
    for (id, count) in id_counts {
        if count > 1 {
            issues.push(Issue::error(format!(
                "project id {} is used by {} projects",
                id, count
            )));
        }
    }

    for project in &tree.projects {
        if project.title.is_empty() {
            issues.push(Issue::warning(format!(
                "project {} has an empty title",
                project.id
            )));
        }
        if !tree.phases.is_empty() && project.phase >= tree.phases.len() {
            issues.push(Issue::error(format!(
                "project {} references phase {} but only {} phases exist",
                project.id,
                project.phase,
                tree.phases.len()
            )));
        }
    }

    issues
}

pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Localized, Phase, Project};

    #[test]
    fn clean_tree_has_no_issues() {
        let tree = ContentTree {
            phases: vec![Phase::default()],
            projects: vec![Project {
                id: 1,
                title: Localized::plain("Blink"),
                ..Project::default()
            }],
            ..ContentTree::default()
        };
        assert!(check(&tree).is_empty());
    }

    #[test]
    fn triple_duplicate_still_one_error() {
        let mut tree = ContentTree::default();
        for _ in 0..3 {
            tree.projects.push(Project {
                id: 3,
                title: Localized::plain("x"),
                ..Project::default()
            });
        }

        let issues: Vec<_> = check(&tree)
            .into_iter()
            .filter(|i| i.severity == Severity::Error)
            .collect();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains('3'));
    }
}
