//! File-tree view state: which directories are expanded and what is selected.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::paths::{is_under, rebase};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Ctrl on Linux/Windows, Cmd on macOS.
    pub toggle: bool,
    pub range: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        toggle: false,
        range: false,
    };
    pub const TOGGLE: Modifiers = Modifiers {
        toggle: true,
        range: false,
    };
    pub const RANGE: Modifiers = Modifiers {
        toggle: false,
        range: true,
    };
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTreeState {
    expanded: BTreeSet<String>,
    /// In click order, no duplicates.
    selection: Vec<String>,
    anchor: Option<String>,
}

impl FileTreeState {
    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    pub fn set_expanded(&mut self, path: &str, expanded: bool) {
        if expanded {
            self.expanded.insert(path.to_string());
        } else {
            self.expanded.remove(path);
        }
    }

    pub fn toggle_expanded(&mut self, path: &str) -> bool {
        let expanded = !self.is_expanded(path);
        self.set_expanded(path, expanded);
        expanded
    }

    /// Applies a click on `path`. `visible_order` is the flattened list of rows as
    /// currently rendered; range selection walks it from the anchor.
    pub fn click(&mut self, path: &str, modifiers: Modifiers, visible_order: &[String]) {
        if modifiers.range {
            if let Some(range) = self.range_from_anchor(path, visible_order) {
                if modifiers.toggle {
                    for entry in range {
                        self.select(entry);
                    }
                } else {
                    self.selection = range;
                }
                return;
            }
        }

        if modifiers.toggle {
            if let Some(index) = self.selection.iter().position(|p| p == path) {
                self.selection.remove(index);
            } else {
                self.selection.push(path.to_string());
            }
        } else {
            self.selection = vec![path.to_string()];
        }
        self.anchor = Some(path.to_string());
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.anchor = None;
    }

    /// Forgets everything at or below `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) {
        self.expanded.retain(|path| !is_under(path, prefix));
        self.selection.retain(|path| !is_under(path, prefix));
        if self.anchor.as_deref().is_some_and(|anchor| is_under(anchor, prefix)) {
            self.anchor = None;
        }
    }

    pub fn rename_prefix(&mut self, from: &str, to: &str) {
        self.expanded = std::mem::take(&mut self.expanded)
            .into_iter()
            .map(|path| rebase(&path, from, to).unwrap_or(path))
            .collect();
        for path in &mut self.selection {
            if let Some(moved) = rebase(path, from, to) {
                *path = moved;
            }
        }
        if let Some(anchor) = self.anchor.as_mut() {
            if let Some(moved) = rebase(anchor, from, to) {
                *anchor = moved;
            }
        }
    }

    fn select(&mut self, path: String) {
        if !self.selection.contains(&path) {
            self.selection.push(path);
        }
    }

    fn range_from_anchor(&self, path: &str, visible_order: &[String]) -> Option<Vec<String>> {
        let anchor = self.anchor.as_deref()?;
        let start = visible_order.iter().position(|p| p == anchor)?;
        let end = visible_order.iter().position(|p| p == path)?;
        let (low, high) = if start <= end { (start, end) } else { (end, start) };
        Some(visible_order[low..=high].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<String> {
        ["src", "src/a.py", "src/b.py", "src/c.py", "tests", "main.py"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn plain_click_replaces_selection() {
        let mut tree = FileTreeState::default();
        tree.click("src/a.py", Modifiers::NONE, &rows());
        tree.click("main.py", Modifiers::NONE, &rows());
        assert_eq!(tree.selection(), ["main.py"]);
        assert_eq!(tree.anchor(), Some("main.py"));
    }

    #[test]
    fn toggle_click_adds_and_removes() {
        let mut tree = FileTreeState::default();
        tree.click("src/a.py", Modifiers::NONE, &rows());
        tree.click("src/c.py", Modifiers::TOGGLE, &rows());
        assert_eq!(tree.selection(), ["src/a.py", "src/c.py"]);
        tree.click("src/a.py", Modifiers::TOGGLE, &rows());
        assert_eq!(tree.selection(), ["src/c.py"]);
        assert_eq!(tree.anchor(), Some("src/a.py"));
    }

    #[test]
    fn shift_click_selects_visible_range_from_anchor() {
        let mut tree = FileTreeState::default();
        tree.click("src/c.py", Modifiers::NONE, &rows());
        tree.click("src/a.py", Modifiers::RANGE, &rows());
        assert_eq!(tree.selection(), ["src/a.py", "src/b.py", "src/c.py"]);
        assert_eq!(tree.anchor(), Some("src/c.py"));

        tree.click("main.py", Modifiers::RANGE, &rows());
        assert_eq!(tree.selection(), ["src/c.py", "tests", "main.py"]);
    }

    #[test]
    fn shift_click_without_anchor_is_a_plain_click() {
        let mut tree = FileTreeState::default();
        tree.click("tests", Modifiers::RANGE, &rows());
        assert_eq!(tree.selection(), ["tests"]);
        assert_eq!(tree.anchor(), Some("tests"));
    }

    #[test]
    fn ctrl_shift_click_extends_selection() {
        let mut tree = FileTreeState::default();
        tree.click("main.py", Modifiers::NONE, &rows());
        tree.click("src/a.py", Modifiers::TOGGLE, &rows());
        tree.click(
            "src/c.py",
            Modifiers {
                toggle: true,
                range: true,
            },
            &rows(),
        );
        assert_eq!(
            tree.selection(),
            ["main.py", "src/a.py", "src/b.py", "src/c.py"]
        );
    }

    #[test]
    fn removing_a_directory_forgets_only_its_subtree() {
        let mut tree = FileTreeState::default();
        tree.set_expanded("src", true);
        tree.set_expanded("src2", true);
        tree.click("src/a.py", Modifiers::NONE, &rows());
        tree.click("src2", Modifiers::TOGGLE, &rows());

        tree.remove_prefix("src");
        assert!(!tree.is_expanded("src"));
        assert!(tree.is_expanded("src2"));
        assert_eq!(tree.selection(), ["src2"]);
        assert_eq!(tree.anchor(), Some("src2"));
    }

    #[test]
    fn rename_moves_expanded_and_selected_paths() {
        let mut tree = FileTreeState::default();
        tree.set_expanded("src", true);
        tree.set_expanded("src/pkg", true);
        tree.click("src/pkg/a.py", Modifiers::NONE, &rows());

        tree.rename_prefix("src", "lib");
        assert!(tree.is_expanded("lib"));
        assert!(tree.is_expanded("lib/pkg"));
        assert!(!tree.is_expanded("src"));
        assert_eq!(tree.selection(), ["lib/pkg/a.py"]);
        assert_eq!(tree.anchor(), Some("lib/pkg/a.py"));
    }
}
