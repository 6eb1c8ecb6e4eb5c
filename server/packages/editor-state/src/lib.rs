//! DOM-free state for the browser editor: tabs and split panes over shared
//! text models, file-tree selection, and sequencing of async requests.

pub mod app;
pub mod model;
pub mod pane;
pub mod paths;
pub mod requests;
pub mod tree;

pub use app::{EditorApp, EditorError, EditorSnapshot};
pub use model::{Model, ModelId, ModelStore};
pub use pane::{Layout, Pane, PaneId, SyncMode, Tab};
pub use requests::{RequestSequencer, Ticket};
pub use tree::{FileTreeState, Modifiers};
