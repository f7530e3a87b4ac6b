//! Configuration loading for GameVault.
//!
//! [`ConfigLoader`] resolves a [`VaultConfig`] from a file, inline JSON, or
//! built-in defaults, then layers credential and root overrides from the
//! environment. [`validate`] reports settings that load fine but are unlikely
//! to do what the operator intended.

pub mod loader;
pub mod validation;

pub use gamevault_core::config::VaultConfig;
pub use loader::{ConfigLoad, ConfigLoader, ConfigSource};
pub use validation::{ConfigWarning, validate};
