//! Tabs, panes and the split layout.

use serde::Serialize;

use crate::model::ModelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PaneId {
    Primary,
    Secondary,
}

impl PaneId {
    pub fn other(self) -> PaneId {
        match self {
            PaneId::Primary => PaneId::Secondary,
            PaneId::Secondary => PaneId::Primary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub path: String,
    pub model: ModelId,
    pub saved: bool,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pane {
    tabs: Vec<Tab>,
    active: Option<String>,
}

impl Pane {
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        let active = self.active.as_deref()?;
        self.tab(active)
    }

    pub fn tab(&self, path: &str) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.path == path)
    }

    pub fn tab_mut(&mut self, path: &str) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|tab| tab.path == path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tab(path).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Inserts at `index` (clamped), or appends when `None`, and activates the tab.
    pub fn insert(&mut self, tab: Tab, index: Option<usize>) {
        let path = tab.path.clone();
        match index {
            Some(index) => {
                let index = index.min(self.tabs.len());
                self.tabs.insert(index, tab);
            }
            None => self.tabs.push(tab),
        }
        self.active = Some(path);
    }

    pub fn activate(&mut self, path: &str) -> bool {
        if self.contains(path) {
            self.active = Some(path.to_string());
            true
        } else {
            false
        }
    }

    /// Removes the tab; if it was active, its right neighbour (or else the left) becomes active.
    pub fn remove(&mut self, path: &str) -> Option<Tab> {
        let index = self.tabs.iter().position(|tab| tab.path == path)?;
        let tab = self.tabs.remove(index);
        if self.active.as_deref() == Some(path) {
            self.active = self
                .tabs
                .get(index)
                .or_else(|| index.checked_sub(1).and_then(|i| self.tabs.get(i)))
                .map(|tab| tab.path.clone());
        }
        Some(tab)
    }

    /// Drops every tab matching `predicate`, returning them.
    pub fn drain_where(&mut self, mut predicate: impl FnMut(&Tab) -> bool) -> Vec<Tab> {
        let paths: Vec<String> = self
            .tabs
            .iter()
            .filter(|tab| predicate(tab))
            .map(|tab| tab.path.clone())
            .collect();
        paths.iter().filter_map(|path| self.remove(path)).collect()
    }

    pub(crate) fn tabs_mut(&mut self) -> impl Iterator<Item = &mut Tab> {
        self.tabs.iter_mut()
    }

    pub(crate) fn set_active_path(&mut self, active: Option<String>) {
        self.active = active;
    }
}

/// How the second pane's models relate to the first when the view is split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Both panes edit the same model.
    #[default]
    Shared,
    /// The second pane gets its own model; edits are replicated between the two.
    Linked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub primary: Pane,
    pub secondary: Option<Pane>,
    pub focused: Option<PaneId>,
}

impl Layout {
    pub fn pane(&self, id: PaneId) -> Option<&Pane> {
        match id {
            PaneId::Primary => Some(&self.primary),
            PaneId::Secondary => self.secondary.as_ref(),
        }
    }

    pub fn pane_mut(&mut self, id: PaneId) -> Option<&mut Pane> {
        match id {
            PaneId::Primary => Some(&mut self.primary),
            PaneId::Secondary => self.secondary.as_mut(),
        }
    }

    pub fn is_split(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn panes(&self) -> impl Iterator<Item = (PaneId, &Pane)> {
        std::iter::once((PaneId::Primary, &self.primary)).chain(
            self.secondary
                .as_ref()
                .map(|pane| (PaneId::Secondary, pane)),
        )
    }

    pub(crate) fn panes_mut(&mut self) -> impl Iterator<Item = &mut Pane> {
        std::iter::once(&mut self.primary).chain(self.secondary.as_mut())
    }

    /// Whether any pane still shows `model`.
    pub fn references(&self, model: ModelId) -> bool {
        self.panes()
            .any(|(_, pane)| pane.tabs().iter().any(|tab| tab.model == model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelStore;

    fn tab(store: &mut ModelStore, path: &str) -> Tab {
        Tab {
            path: path.to_string(),
            model: store.create(path, ""),
            saved: true,
            read_only: false,
        }
    }

    #[test]
    fn closing_active_tab_activates_neighbour() {
        let mut store = ModelStore::default();
        let mut pane = Pane::default();
        for path in ["a.py", "b.py", "c.py"] {
            pane.insert(tab(&mut store, path), None);
        }
        pane.activate("b.py");

        pane.remove("b.py");
        assert_eq!(pane.active(), Some("c.py"));
        pane.remove("c.py");
        assert_eq!(pane.active(), Some("a.py"));
        pane.remove("a.py");
        assert_eq!(pane.active(), None);
    }

    #[test]
    fn insert_clamps_index() {
        let mut store = ModelStore::default();
        let mut pane = Pane::default();
        pane.insert(tab(&mut store, "a.py"), None);
        pane.insert(tab(&mut store, "b.py"), Some(0));
        pane.insert(tab(&mut store, "c.py"), Some(99));

        let order: Vec<_> = pane.tabs().iter().map(|tab| tab.path.as_str()).collect();
        assert_eq!(order, ["b.py", "a.py", "c.py"]);
        assert_eq!(pane.active(), Some("c.py"));
    }
}
