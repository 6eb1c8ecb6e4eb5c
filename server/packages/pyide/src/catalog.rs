//! Starter templates and editor snippets compiled into the binary.

use include_dir::{include_dir, Dir};
use pyide_error::IdeError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

static TEMPLATES_DIR: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/templates");
const SNIPPETS_JSON: &str = include_str!("../snippets.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    pub file_name: String,
    pub description: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub prefix: String,
    pub label: String,
    pub description: String,
    /// Body with `${n:placeholder}` tab stops.
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    templates: Vec<Template>,
    snippets: Vec<Snippet>,
}

impl Catalog {
    pub fn load() -> Result<Self, IdeError> {
        let snippets: Vec<Snippet> =
            serde_json::from_str(SNIPPETS_JSON).map_err(|err| IdeError::ProtocolParse {
                message: format!("bundled snippets are invalid: {err}"),
            })?;

        let mut templates: Vec<Template> = TEMPLATES_DIR
            .files()
            .filter(|file| file.path().extension().is_some_and(|ext| ext == "py"))
            .filter_map(|file| {
                let file_name = file.path().file_name()?.to_string_lossy().to_string();
                let content = file.contents_utf8()?.to_string();
                Some(Template {
                    name: display_name(&file_name),
                    description: docstring_summary(&content),
                    file_name,
                    content,
                })
            })
            .collect();
        templates.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        tracing::debug!(
            templates = templates.len(),
            snippets = snippets.len(),
            "loaded bundled catalog"
        );
        Ok(Self {
            templates,
            snippets,
        })
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn snippets(&self) -> &[Snippet] {
        &self.snippets
    }
}

/// `hello_world.py` -> `Hello World`.
fn display_name(file_name: &str) -> String {
    let stem = file_name.strip_suffix(".py").unwrap_or(file_name);
    stem.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First line of a leading module docstring.
fn docstring_summary(content: &str) -> String {
    let Some(rest) = content.trim_start().strip_prefix("\"\"\"") else {
        return String::new();
    };
    let line = rest.lines().next().unwrap_or_default();
    line.split("\"\"\"").next().unwrap_or_default().trim().to_string()
}
