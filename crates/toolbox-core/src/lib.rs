//! Core of toolbox: the tools file and the component registry.
//!
//! [`ToolsFile`] turns YAML into kind-resolved configurations and
//! [`Registry`] turns those into live sources, auth services, tools and
//! toolsets.

pub mod config;
pub mod error;
pub mod registry;

pub use config::ToolsFile;
pub use error::{CallError, ConfigError, ConfigResult, RegistryError, RegistryResult};
pub use registry::Registry;
