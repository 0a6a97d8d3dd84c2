//! SQLite session storage for the HVAC engine: persisted document
//! snapshots, the durable session log, and the sync settings file.

pub mod error;
pub mod json_bridge;
pub mod schema;
pub mod settings;
pub mod store;
pub mod workspace;

pub use error::{Result, StoreError};
pub use settings::SettingsFile;
pub use store::{LoggedEntry, Store, StoredDocument};
pub use workspace::{DATA_DIR_ENV, Workspace, default_base_dir};
