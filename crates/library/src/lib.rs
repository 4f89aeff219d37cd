//! Chart library management.
//!
//! Everything here operates on an explicit [`Context`]: three storage
//! [`Location`]s (the library itself, a backup area and a staging area) plus
//! the naming template and tuning knobs. There is no global state.
//!
//! - [`install`] streams a container into staging, then commits it into the
//!   library, optionally replacing (and backing up) an existing package.
//! - [`scan`] walks the library and fingerprints every installed chart.
//! - [`reconcile`] cleans up after a crash: stale staging is deleted and
//!   leftover backups are restored.
//! - [`transaction`] and [`backup`] are the storage primitives the above are
//!   built from.

pub mod backup;
mod context;
pub mod error;
pub mod install;
mod models;
mod naming;
pub mod reconcile;
pub mod scan;
pub mod transaction;

pub use crate::context::{Context, DEFAULT_CONCURRENCY, Location};
pub use crate::models::ChartMeta;
pub use crate::naming::{DEFAULT_TEMPLATE, MAX_NAME_LEN, NameGenerator};
