mod catalog;
mod command;
mod config;
mod error;
mod version;

pub use catalog::{parse_version_listing, VersionCatalog, VersionSource};
pub use command::{BuildStep, InstallOptions, LifecycleCommand};
pub use config::{default_user_prefix, AltpyConfig, DEFAULT_ALIAS_PREFIX, DEFAULT_SOURCE_BASE_URL};
pub use error::LifecycleError;
pub use version::{is_well_formed, VersionId};
