//! Persistence core of the course authoring tool: one in-memory
//! content tree kept consistent across a debounced local draft cache,
//! the nested authoring document format, and a normalized relational
//! store. Consumed as a library by the UI layer; no transport or
//! rendering lives here.

pub mod bridge;
pub mod config;
pub mod content;
pub mod draft;
pub mod model;
pub mod remote;
pub mod undo;
pub mod validate;

pub use config::{AuthoringConfig, Surface};
pub use content::{ContentStore, CourseEntry, PhaseRemoval};
pub use draft::{CacheStatus, DraftStore, FileDraftStore, MemoryDraftStore};
pub use model::{Component, ContentTree, Course, Hotspot, Localized, Phase, Project, QuizQuestion};
pub use remote::{Filter, Record, RecordStore, RemoteSync, SqliteStore, StoreError};
pub use undo::{UndoEntry, UndoKind};
pub use validate::{Issue, Severity};
