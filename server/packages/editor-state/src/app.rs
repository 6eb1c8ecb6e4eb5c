//! [`EditorApp`]: the single owner of editor state.
//!
//! The browser shell forwards user intents here and renders from
//! [`EditorApp::snapshot`]; nothing else mutates tabs, models or tree state.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Model, ModelId, ModelStore};
use crate::pane::{Layout, Pane, PaneId, SyncMode, Tab};
use crate::paths::{is_under, rebase};
use crate::requests::{RequestSequencer, Ticket};
use crate::tree::FileTreeState;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("no tab for {path} in the {pane:?} pane")]
    NoSuchTab { pane: PaneId, path: String },
    #[error("the editor is not split")]
    NotSplit,
    #[error("the editor is already split")]
    AlreadySplit,
    #[error("no active tab to split")]
    NothingToSplit,
    #[error("{path} is read-only")]
    ReadOnly { path: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSnapshot<'a> {
    pub layout: &'a Layout,
    pub tree: &'a FileTreeState,
    pub sync_mode: SyncMode,
}

#[derive(Debug, Default)]
pub struct EditorApp {
    models: ModelStore,
    layout: Layout,
    tree: FileTreeState,
    requests: RequestSequencer,
    sync_mode: SyncMode,
    /// Linked model pairs, stored in both directions.
    links: HashMap<ModelId, ModelId>,
    /// Set while an edit is being copied to a linked model. One flag for all
    /// files, so a replication never triggers a second one.
    replicating: bool,
}

impl EditorApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    pub fn tree(&self) -> &FileTreeState {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut FileTreeState {
        &mut self.tree
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn snapshot(&self) -> EditorSnapshot<'_> {
        EditorSnapshot {
            layout: &self.layout,
            tree: &self.tree,
            sync_mode: self.sync_mode,
        }
    }

    pub fn model_for(&self, pane: PaneId, path: &str) -> Option<&Model> {
        let tab = self.layout.pane(pane)?.tab(path)?;
        self.models.get(tab.model)
    }

    pub fn begin_request(&mut self, key: impl Into<String>) -> Ticket {
        self.requests.issue(key)
    }

    pub fn accept(&mut self, ticket: &Ticket) -> bool {
        self.requests.accept(ticket)
    }

    /// Opens `path` in `pane`, reusing the other pane's model when the file is already open there.
    pub fn open_file(
        &mut self,
        pane: PaneId,
        path: &str,
        content: impl Into<String>,
        read_only: bool,
    ) -> Result<ModelId, EditorError> {
        let shared = self
            .layout
            .pane(pane.other())
            .and_then(|other| other.tab(path))
            .map(|tab| tab.model);
        let target = self.layout.pane_mut(pane).ok_or(EditorError::NotSplit)?;
        if let Some(tab) = target.tab(path) {
            let model = tab.model;
            target.activate(path);
            self.layout.focused = Some(pane);
            return Ok(model);
        }

        let model = match shared {
            Some(model) => model,
            None => self.models.create(path, content),
        };
        target.insert(
            Tab {
                path: path.to_string(),
                model,
                saved: true,
                read_only,
            },
            None,
        );
        self.layout.focused = Some(pane);
        tracing::debug!(?pane, path, %model, "opened tab");
        Ok(model)
    }

    pub fn close_tab(&mut self, pane: PaneId, path: &str) -> Result<(), EditorError> {
        let tab = self
            .layout
            .pane_mut(pane)
            .and_then(|target| target.remove(path))
            .ok_or_else(|| no_such_tab(pane, path))?;
        self.release_model(tab.model);
        self.collapse_empty_secondary();
        Ok(())
    }

    pub fn activate(&mut self, pane: PaneId, path: &str) -> Result<(), EditorError> {
        let activated = self
            .layout
            .pane_mut(pane)
            .is_some_and(|target| target.activate(path));
        if !activated {
            return Err(no_such_tab(pane, path));
        }
        self.layout.focused = Some(pane);
        Ok(())
    }

    /// Replaces the buffer content behind a tab and returns the model's new version.
    pub fn apply_edit(&mut self, pane: PaneId, path: &str, content: &str) -> Result<u64, EditorError> {
        let tab = self
            .layout
            .pane(pane)
            .and_then(|target| target.tab(path))
            .ok_or_else(|| no_such_tab(pane, path))?;
        if tab.read_only {
            return Err(EditorError::ReadOnly {
                path: path.to_string(),
            });
        }
        let model = tab.model;
        let version = self
            .write_model(model, content)
            .ok_or_else(|| no_such_tab(pane, path))?;

        let peer = self.links.get(&model).copied();
        for target in self.layout.panes_mut() {
            for tab in target.tabs_mut() {
                if tab.model == model || Some(tab.model) == peer {
                    tab.saved = false;
                }
            }
        }
        Ok(version)
    }

    /// Marks every tab showing `path` as saved; returns how many were touched.
    pub fn mark_saved(&mut self, path: &str) -> usize {
        let mut touched = 0;
        for target in self.layout.panes_mut() {
            if let Some(tab) = target.tab_mut(path) {
                tab.saved = true;
                touched += 1;
            }
        }
        touched
    }

    /// Opens the secondary pane on the primary pane's active file.
    pub fn split(&mut self, mode: SyncMode) -> Result<(), EditorError> {
        if self.layout.is_split() {
            return Err(EditorError::AlreadySplit);
        }
        let source = self
            .layout
            .primary
            .active_tab()
            .cloned()
            .ok_or(EditorError::NothingToSplit)?;

        let model = match mode {
            SyncMode::Shared => source.model,
            SyncMode::Linked => {
                let content = self
                    .models
                    .get(source.model)
                    .map(|model| model.content.clone())
                    .unwrap_or_default();
                let copy = self.models.create(&source.path, content);
                self.links.insert(source.model, copy);
                self.links.insert(copy, source.model);
                copy
            }
        };

        let mut secondary = Pane::default();
        secondary.insert(Tab { model, ..source }, None);
        self.layout.secondary = Some(secondary);
        self.layout.focused = Some(PaneId::Secondary);
        self.sync_mode = mode;
        tracing::debug!(?mode, "split editor");
        Ok(())
    }

    /// Closes the secondary pane, moving its tabs that the primary lacks into the primary.
    pub fn unsplit(&mut self) -> Result<(), EditorError> {
        let secondary = self.layout.secondary.take().ok_or(EditorError::NotSplit)?;
        let active = self.layout.primary.active().map(str::to_string);
        let mut dropped = Vec::new();
        for tab in secondary.tabs() {
            if self.layout.primary.contains(&tab.path) {
                dropped.push(tab.model);
            } else {
                self.layout.primary.insert(tab.clone(), None);
            }
        }
        if active.is_some() {
            self.layout.primary.set_active_path(active);
        }
        for model in dropped {
            self.release_model(model);
        }
        self.layout.focused = Some(PaneId::Primary);
        self.sync_mode = SyncMode::Shared;
        Ok(())
    }

    /// Drags a tab to `to` at `index`. Dropping onto the secondary pane splits the editor.
    pub fn move_tab(
        &mut self,
        from: PaneId,
        to: PaneId,
        path: &str,
        index: Option<usize>,
    ) -> Result<(), EditorError> {
        if !self.layout.pane(from).is_some_and(|pane| pane.contains(path)) {
            return Err(no_such_tab(from, path));
        }
        if to == PaneId::Secondary && !self.layout.is_split() {
            self.layout.secondary = Some(Pane::default());
        }
        let tab = self
            .layout
            .pane_mut(from)
            .and_then(|pane| pane.remove(path))
            .ok_or_else(|| no_such_tab(from, path))?;
        let target = self.layout.pane_mut(to).ok_or(EditorError::NotSplit)?;

        if from != to && target.contains(path) {
            target.activate(path);
            self.release_model(tab.model);
        } else {
            target.insert(tab, index);
        }
        self.layout.focused = Some(to);
        self.collapse_empty_secondary();
        Ok(())
    }

    /// Follows a rename of a file or directory (everything under it moves too).
    pub fn rename_path(&mut self, from: &str, to: &str) {
        self.models.rename_prefix(from, to);
        for pane in self.layout.panes_mut() {
            let active = pane
                .active()
                .map(|active| rebase(active, from, to).unwrap_or_else(|| active.to_string()));
            for tab in pane.tabs_mut() {
                if let Some(moved) = rebase(&tab.path, from, to) {
                    tab.path = moved;
                }
            }
            pane.set_active_path(active);
        }
        self.tree.rename_prefix(from, to);
    }

    /// Follows a delete: closes tabs and forgets tree state for `path` and everything below it.
    pub fn remove_path(&mut self, path: &str) -> usize {
        let mut closed = Vec::new();
        for pane in self.layout.panes_mut() {
            closed.extend(pane.drain_where(|tab| is_under(&tab.path, path)));
        }
        for tab in &closed {
            self.release_model(tab.model);
        }
        self.tree.remove_prefix(path);
        self.collapse_empty_secondary();
        closed.len()
    }

    fn write_model(&mut self, model: ModelId, content: &str) -> Option<u64> {
        let version = self.models.set_content(model, content)?;
        if !self.replicating {
            if let Some(&peer) = self.links.get(&model) {
                self.replicating = true;
                self.write_model(peer, content);
                self.replicating = false;
            }
        }
        Some(version)
    }

    fn release_model(&mut self, model: ModelId) {
        if self.layout.references(model) {
            return;
        }
        self.models.remove(model);
        if let Some(peer) = self.links.remove(&model) {
            self.links.remove(&peer);
        }
    }

    fn collapse_empty_secondary(&mut self) {
        if self.layout.secondary.as_ref().is_some_and(Pane::is_empty) {
            self.layout.secondary = None;
            self.sync_mode = SyncMode::Shared;
            if self.layout.focused == Some(PaneId::Secondary) {
                self.layout.focused = Some(PaneId::Primary);
            }
        }
    }
}

fn no_such_tab(pane: PaneId, path: &str) -> EditorError {
    EditorError::NoSuchTab {
        pane,
        path: path.to_string(),
    }
}
