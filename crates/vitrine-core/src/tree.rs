//! # Category Forest
//!
//! In-memory view of a tenant's category parent links. Answers the
//! structural questions the repository needs before writing:
//!
//! ```text
//!            apparel                    validate_reparent(apparel, shoes)
//!           /       \                        │
//!       shoes       hats                     ▼
//!        /                             ancestors(shoes) = [apparel, shoes]
//!    sneakers                          contains apparel → InvalidTransition
//! ```
//!
//! Parent chains in storage are acyclic, but every walk here is bounded by
//! a visited set anyway so a corrupt row cannot hang a request.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{CoreError, CoreResult};

/// Parent links of one tenant's live categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryForest {
    parents: HashMap<String, Option<String>>,
    children: HashMap<String, Vec<String>>,
}

impl CategoryForest {
    /// Builds the forest from `(id, parent_id)` pairs.
    pub fn new<I>(links: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut forest = CategoryForest::default();
        for (id, parent) in links {
            if let Some(p) = &parent {
                forest
                    .children
                    .entry(p.clone())
                    .or_default()
                    .push(id.clone());
            }
            forest.parents.insert(id, parent);
        }
        forest
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id)
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).and_then(|p| p.as_deref())
    }

    /// Direct children of `id`.
    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Chain from the root down to `id`, inclusive.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(id.to_string());

        while let Some(current) = cursor {
            if !self.contains(&current) || !seen.insert(current.clone()) {
                break;
            }
            cursor = self.parent_of(&current).map(str::to_string);
            chain.push(current);
        }

        chain.reverse();
        chain
    }

    /// `id` and every category beneath it, breadth-first.
    pub fn subtree(&self, id: &str) -> Vec<String> {
        if !self.contains(id) {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id.to_string()]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            queue.extend(self.children(&current).iter().cloned());
            out.push(current);
        }
        out
    }

    /// True when `candidate` is `node` itself or lies beneath it.
    pub fn is_self_or_descendant(&self, node: &str, candidate: &str) -> bool {
        self.ancestors(candidate).iter().any(|a| a == node)
    }

    /// Checks that `id` may hang under `new_parent`.
    ///
    /// `None` always succeeds. A parent that is `id` itself or one of its
    /// descendants is an `InvalidTransition`; an unknown parent is `NotFound`.
    pub fn validate_reparent(&self, id: &str, new_parent: Option<&str>) -> CoreResult<()> {
        let Some(parent) = new_parent else {
            return Ok(());
        };

        if !self.contains(parent) {
            return Err(CoreError::not_found("category", parent));
        }

        if self.is_self_or_descendant(id, parent) {
            return Err(CoreError::invalid_transition(
                "category",
                format!("{} cannot be placed under its own descendant {}", id, parent),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CategoryForest {
        CategoryForest::new([
            ("apparel".to_string(), None),
            ("shoes".to_string(), Some("apparel".to_string())),
            ("hats".to_string(), Some("apparel".to_string())),
            ("sneakers".to_string(), Some("shoes".to_string())),
            ("garden".to_string(), None),
        ])
    }

    #[test]
    fn test_ancestors_root_to_leaf() {
        let forest = sample();
        assert_eq!(forest.ancestors("sneakers"), vec!["apparel", "shoes", "sneakers"]);
        assert_eq!(forest.ancestors("garden"), vec!["garden"]);
        assert!(forest.ancestors("missing").is_empty());
    }

    #[test]
    fn test_subtree_includes_root() {
        let forest = sample();
        let mut subtree = forest.subtree("apparel");
        subtree.sort();
        assert_eq!(subtree, vec!["apparel", "hats", "shoes", "sneakers"]);
    }

    #[test]
    fn test_reparent_under_descendant_fails() {
        let forest = sample();
        for target in ["apparel", "shoes", "sneakers", "hats"] {
            let err = forest.validate_reparent("apparel", Some(target)).unwrap_err();
            assert!(matches!(err, CoreError::InvalidTransition { .. }), "{target}");
        }
    }

    #[test]
    fn test_reparent_to_none_or_sibling_tree_succeeds() {
        let forest = sample();
        assert!(forest.validate_reparent("shoes", None).is_ok());
        assert!(forest.validate_reparent("shoes", Some("garden")).is_ok());
        assert!(forest.validate_reparent("sneakers", Some("hats")).is_ok());
    }

    #[test]
    fn test_reparent_to_unknown_parent() {
        let forest = sample();
        let err = forest.validate_reparent("shoes", Some("ghost")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_corrupt_cycle_terminates() {
        let forest = CategoryForest::new([
            ("a".to_string(), Some("b".to_string())),
            ("b".to_string(), Some("a".to_string())),
        ]);
        assert_eq!(forest.ancestors("a").len(), 2);
        assert_eq!(forest.subtree("a").len(), 2);
    }
}
