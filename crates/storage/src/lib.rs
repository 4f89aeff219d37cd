pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::{EntryInfo, EntryKind};
pub use crate::path::{is_reserved_device_name, validate as validate_path, validate_name};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
