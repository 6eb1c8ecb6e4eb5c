use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ModelId(u64);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model-{}", self.0)
    }
}

/// Text buffer behind one or more tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    pub id: ModelId,
    pub path: String,
    pub content: String,
    /// Bumped on every edit, starting at 1.
    pub version: u64,
}

#[derive(Debug, Default)]
pub struct ModelStore {
    models: BTreeMap<ModelId, Model>,
    next_id: u64,
}

impl ModelStore {
    pub fn create(&mut self, path: &str, content: impl Into<String>) -> ModelId {
        self.next_id += 1;
        let id = ModelId(self.next_id);
        self.models.insert(
            id,
            Model {
                id,
                path: path.to_string(),
                content: content.into(),
                version: 1,
            },
        );
        id
    }

    pub fn get(&self, id: ModelId) -> Option<&Model> {
        self.models.get(&id)
    }

    /// Replaces the content and returns the new version.
    pub fn set_content(&mut self, id: ModelId, content: &str) -> Option<u64> {
        let model = self.models.get_mut(&id)?;
        model.content = content.to_string();
        model.version += 1;
        Some(model.version)
    }

    pub fn remove(&mut self, id: ModelId) -> Option<Model> {
        self.models.remove(&id)
    }

    pub fn rename_prefix(&mut self, from: &str, to: &str) {
        for model in self.models.values_mut() {
            if let Some(path) = crate::paths::rebase(&model.path, from, to) {
                model.path = path;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
