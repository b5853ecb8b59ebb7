//! LCA directory grounding over a path-segment trie.
//!
//! `compute_lca` returns the minimal set of directories that cover a set of
//! input directories: every trie node that is branching (more than one child)
//! or terminal (the final segment of an inserted path), with each such node
//! consolidating its entire descendant subtree. The result is stable under
//! permutation of the input and no returned path is a strict prefix of
//! another.

use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    is_terminal: bool,
}

impl TrieNode {
    fn insert(&mut self, segments: &[&str]) {
        if segments.is_empty() {
            self.is_terminal = true;
            return;
        }
        self.children
            .entry(segments[0].to_string())
            .or_default()
            .insert(&segments[1..]);
    }

    fn is_branching(&self) -> bool {
        self.children.len() > 1
    }
}

/// Directory of a POSIX-separated relative file path. Files at the
/// repository root ground to `"."`.
pub fn dir_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        _ => ".".to_string(),
    }
}

/// Compute the set of LCA directories covering `dirs`, sorted ascending.
pub fn compute_lca<S: AsRef<str>>(dirs: &[S]) -> Vec<String> {
    let mut root = TrieNode::default();
    let mut inserted = false;
    for dir in dirs {
        let dir = dir.as_ref();
        let dir = if dir.is_empty() { "." } else { dir };
        let segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            root.children.entry(".".to_string()).or_default().is_terminal = true;
        } else {
            root.insert(&segments);
        }
        inserted = true;
    }
    if !inserted {
        return Vec::new();
    }

    // The root itself is never a candidate; it only unions child results.
    let mut results = Vec::new();
    for (segment, child) in &root.children {
        collect(child, segment, &mut results);
    }
    results.sort();
    results.dedup();
    results
}

/// Post-order collection: a branching or terminal node consolidates its
/// subtree, replacing any deeper results.
fn collect(node: &TrieNode, path: &str, results: &mut Vec<String>) {
    if node.is_branching() || node.is_terminal || node.children.is_empty() {
        results.push(path.to_string());
        return;
    }
    for (segment, child) in &node.children {
        collect(child, &format!("{path}/{segment}"), results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_directories_consolidate_to_parent() {
        let lca = compute_lca(&["a/b", "a/c", "a/d"]);
        assert_eq!(lca, vec!["a".to_string()]);
    }

    #[test]
    fn single_directory_is_its_own_lca() {
        let lca = compute_lca(&["src/graph"]);
        assert_eq!(lca, vec!["src/graph".to_string()]);
    }

    #[test]
    fn disjoint_trees_yield_multiple_lcas() {
        let lca = compute_lca(&["src/utils", "tests/utils"]);
        assert_eq!(lca, vec!["src/utils".to_string(), "tests/utils".to_string()]);
    }

    #[test]
    fn terminal_ancestor_consolidates_descendants() {
        let lca = compute_lca(&["a", "a/b", "a/b/c"]);
        assert_eq!(lca, vec!["a".to_string()]);
    }

    #[test]
    fn similar_prefix_segments_are_distinct() {
        let lca = compute_lca(&["src/graph", "src/graph-store"]);
        // Segment trie: "graph" is not a prefix of "graph-store".
        assert_eq!(lca, vec!["src".to_string()]);
    }

    #[test]
    fn stable_under_permutation() {
        let a = compute_lca(&["src/a", "src/b", "lib/c"]);
        let b = compute_lca(&["lib/c", "src/b", "src/a"]);
        assert_eq!(a, b);
    }

    #[test]
    fn no_output_is_strict_prefix_of_another() {
        let lca = compute_lca(&["x/y", "x/y/z", "x/w", "q"]);
        for a in &lca {
            for b in &lca {
                if a != b {
                    assert!(!b.starts_with(&format!("{a}/")), "{a} is a prefix of {b}");
                }
            }
        }
    }

    #[test]
    fn empty_input_is_empty() {
        let lca = compute_lca::<&str>(&[]);
        assert!(lca.is_empty());
    }

    #[test]
    fn root_files_ground_to_dot() {
        assert_eq!(dir_of("a.ts"), ".");
        assert_eq!(dir_of("src/a.ts"), "src");
        assert_eq!(compute_lca(&[""]), vec![".".to_string()]);
    }

    #[test]
    fn idempotent_over_own_output() {
        let once = compute_lca(&["a/b/c", "a/b/d", "e/f"]);
        let twice = compute_lca(&once);
        assert_eq!(once, twice);
    }
}
