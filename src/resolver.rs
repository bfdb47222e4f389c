// src/resolver.rs

//! Dependency resolution
//!
//! Computes the transitive closure of a set of requested packages and
//! orders it so every package comes after all of its dependencies.

use crate::error::{Error, Result};
use crate::repository::Index;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Traversal state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// Dependencies are being resolved; seeing it again means a cycle
    InProgress,
    Done,
}

/// Resolve `requested` against `index` into installation order.
///
/// Depth-first, post-order: a package is emitted after all of its
/// dependencies and at most once. Requested packages keep their relative
/// order where the graph allows it.
pub fn resolve(requested: &[String], index: &Index) -> Result<Vec<String>> {
    let mut resolver = Resolver {
        index,
        marks: HashMap::new(),
        stack: Vec::new(),
        order: Vec::new(),
    };

    for name in requested {
        resolver.visit(name)?;
    }

    debug!("Resolved {:?} to {:?}", requested, resolver.order);
    debug_assert!(is_dependency_ordered(&resolver.order, index));
    Ok(resolver.order)
}

struct Resolver<'a> {
    index: &'a Index,
    marks: HashMap<&'a str, Mark>,
    /// Current traversal path, for cycle reporting
    stack: Vec<&'a str>,
    order: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn visit(&mut self, name: &str) -> Result<()> {
        let index = self.index;
        let entry = index.lookup(name)?;
        let name = entry.name.as_str();

        match self.marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = self.stack.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Err(Error::CyclicDependency(cycle));
            }
            None => {}
        }

        self.marks.insert(name, Mark::InProgress);
        self.stack.push(name);

        for dep in &entry.dependencies {
            self.visit(dep)?;
        }

        self.stack.pop();
        self.marks.insert(name, Mark::Done);
        self.order.push(name.to_string());
        Ok(())
    }
}

/// Check that `order` lists every dependency before its dependents
fn is_dependency_ordered(order: &[String], index: &Index) -> bool {
    let mut seen = HashSet::new();
    for name in order {
        let Some(entry) = index.get(name) else {
            return false;
        };
        if !entry.dependencies.iter().all(|dep| seen.contains(dep.as_str())) {
            return false;
        }
        seen.insert(name.as_str());
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::IndexEntry;

    fn mock_index(edges: &[(&str, &[&str])]) -> Index {
        Index::from_entries(edges.iter().map(|(name, deps)| IndexEntry {
            name: name.to_string(),
            version: "1.0".to_string(),
            url: format!("http://repo/{}-1.0.tar.gz", name),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simple_resolution() {
        let index = mock_index(&[("a", &["b"]), ("b", &[])]);
        let resolved = resolve(&names(&["a"]), &index).unwrap();
        assert_eq!(resolved, vec!["b", "a"]);
    }

    #[test]
    fn test_diamond_emits_each_once() {
        let index = mock_index(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
        ]);

        let resolved = resolve(&names(&["a"]), &index).unwrap();
        assert_eq!(resolved, vec!["d", "b", "c", "a"]);
        assert!(is_dependency_ordered(&resolved, &index));
    }

    #[test]
    fn test_multiple_requests_share_dependencies() {
        let index = mock_index(&[("x", &["lib"]), ("y", &["lib"]), ("lib", &[])]);
        let resolved = resolve(&names(&["x", "y", "x"]), &index).unwrap();
        assert_eq!(resolved, vec!["lib", "x", "y"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let index = mock_index(&[("a", &["ghost"])]);
        let err = resolve(&names(&["a"]), &index).unwrap_err();
        assert!(matches!(err, Error::UnknownPackage(n) if n == "ghost"));
    }

    #[test]
    fn test_two_node_cycle() {
        let index = mock_index(&[("a", &["b"]), ("b", &["a"])]);
        let err = resolve(&names(&["a"]), &index).unwrap_err();
        match err {
            Error::CyclicDependency(path) => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_below_root_reports_only_cycle() {
        let index = mock_index(&[("root", &["x"]), ("x", &["y"]), ("y", &["z"]), ("z", &["x"])]);
        let err = resolve(&names(&["root"]), &index).unwrap_err();
        match err {
            Error::CyclicDependency(path) => assert_eq!(path, vec!["x", "y", "z", "x"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let index = mock_index(&[("a", &["a"])]);
        assert!(matches!(
            resolve(&names(&["a"]), &index),
            Err(Error::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_order_check_rejects_dependents_first() {
        let index = mock_index(&[("a", &["b"]), ("b", &[])]);
        assert!(is_dependency_ordered(&names(&["b", "a"]), &index));
        assert!(!is_dependency_ordered(&names(&["a", "b"]), &index));
        assert!(!is_dependency_ordered(&names(&["zzz"]), &index));
    }

    #[test]
    fn test_larger_graph_is_ordered() {
        let index = mock_index(&[
            ("app", &["net", "log", "cfg"]),
            ("net", &["tls", "log"]),
            ("tls", &["crypto"]),
            ("crypto", &[]),
            ("log", &["fmt"]),
            ("fmt", &[]),
            ("cfg", &["fmt", "crypto"]),
            ("tool", &["cfg"]),
        ]);

        let resolved = resolve(&names(&["tool", "app"]), &index).unwrap();
        assert_eq!(resolved.len(), 8);
        assert!(is_dependency_ordered(&resolved, &index));
        let unique: HashSet<_> = resolved.iter().collect();
        assert_eq!(unique.len(), resolved.len());
    }
}
