//! Record of the directories the agent has listed.
//!
//! Every `list_files` call marks its directory as explored; the tree is then
//! rebuilt so the prompt shows the immediate children of the project root
//! and of each explored directory.

use ignore::WalkBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const NO_EXPLORATION: &str = "No directories have been explored yet.";

/// One child of an explored directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeNode {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct ExplorationRecord {
    root: PathBuf,
    explored_dirs: BTreeSet<String>,
    /// Directory (relative, `.` for the root) to its sorted children.
    tree: BTreeMap<String, Vec<TreeNode>>,
}

impl ExplorationRecord {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            explored_dirs: BTreeSet::new(),
            tree: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mark `directory` as explored. Returns false if it already was.
    pub fn track_directory(&mut self, directory: &str) -> bool {
        let key = self.normalize(directory);
        debug!(directory = %key, "Directory explored");
        self.explored_dirs.insert(key)
    }

    pub fn is_explored(&self, directory: &str) -> bool {
        self.explored_dirs.contains(&self.normalize(directory))
    }

    pub fn explored_dirs(&self) -> impl Iterator<Item = &str> {
        self.explored_dirs.iter().map(String::as_str)
    }

    pub fn children(&self, directory: &str) -> Option<&[TreeNode]> {
        self.tree.get(&self.normalize(directory)).map(Vec::as_slice)
    }

    fn normalize(&self, directory: &str) -> String {
        let trimmed = directory.trim();
        let relative = Path::new(trimmed)
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| trimmed.to_string());
        let relative = relative.trim_start_matches("./").trim_end_matches('/');
        if relative.is_empty() || relative == "." {
            ".".to_string()
        } else {
            relative.to_string()
        }
    }

    /// Re-list the root and every explored directory.
    pub fn rebuild_tree(&mut self) {
        let mut tree = BTreeMap::new();
        let dirs = std::iter::once(".".to_string()).chain(self.explored_dirs.iter().cloned());
        for dir in dirs {
            let full = if dir == "." { self.root.clone() } else { self.root.join(&dir) };
            if !full.is_dir() {
                warn!(directory = %dir, "Explored directory no longer exists");
                continue;
            }
            tree.insert(dir, list_children(&full));
        }
        self.tree = tree;
    }

    /// Render the explored structure for the prompt.
    pub fn render(&self) -> String {
        if self.explored_dirs.is_empty() {
            return NO_EXPLORATION.to_string();
        }

        let mut out = format!("Project root: {}\n", self.root.display());
        let explored: Vec<&str> = self.explored_dirs().collect();
        out.push_str(&format!("Explored directories: {}\n", explored.join(", ")));

        for (dir, children) in &self.tree {
            out.push_str(&format!("\n{dir}/\n"));
            if children.is_empty() {
                out.push_str("  (empty)\n");
            }
            for child in children {
                if child.is_dir {
                    out.push_str(&format!("  📁 {}/\n", child.name));
                } else {
                    out.push_str(&format!("  📄 {}\n", child.name));
                }
            }
        }
        out
    }
}

/// Immediate children of `dir`, directories first, then files, each sorted by name.
fn list_children(dir: &Path) -> Vec<TreeNode> {
    let walker = WalkBuilder::new(dir)
        .hidden(true)
        .parents(false)
        .require_git(false)
        .max_depth(Some(1))
        .build();

    let mut children: Vec<TreeNode> = walker
        .filter_map(Result::ok)
        .filter(|entry| entry.depth() == 1)
        .map(|entry| TreeNode {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: entry.file_type().is_some_and(|t| t.is_dir()),
        })
        .collect();
    children.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    children
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join(".secret"), "").unwrap();
        dir
    }

    #[test]
    fn empty_record_renders_placeholder() {
        let record = ExplorationRecord::new("/tmp");
        assert_eq!(record.render(), NO_EXPLORATION);
    }

    #[test]
    fn normalizes_directory_names() {
        let mut record = ExplorationRecord::new("/work/project");
        assert!(record.track_directory("./src/"));
        assert!(!record.track_directory("src"));
        assert!(record.track_directory(""));
        assert!(!record.track_directory("/work/project"));
        assert!(record.is_explored("."));
        assert_eq!(record.explored_dirs().collect::<Vec<_>>(), vec![".", "src"]);
    }

    #[test]
    fn explored_directories_have_children() {
        let dir = project();
        let mut record = ExplorationRecord::new(dir.path());
        record.track_directory("src");
        record.rebuild_tree();

        let root = record.children(".").unwrap();
        assert_eq!(
            root,
            &[
                TreeNode { name: "src".into(), is_dir: true },
                TreeNode { name: "README.md".into(), is_dir: false },
            ]
        );
        let src = record.children("src").unwrap();
        assert_eq!(src.len(), 2);
        assert!(record.children("src/nested").is_none());

        let text = record.render();
        assert!(text.contains("Explored directories: src"));
        assert!(text.contains("\nsrc/\n  📁 nested/\n  📄 lib.rs\n"));
        assert!(!text.contains(".secret"));
    }

    #[test]
    fn vanished_directories_are_skipped() {
        let dir = project();
        let mut record = ExplorationRecord::new(dir.path());
        record.track_directory("gone");
        record.rebuild_tree();
        assert!(record.children("gone").is_none());
        assert!(record.children(".").is_some());
    }
}
