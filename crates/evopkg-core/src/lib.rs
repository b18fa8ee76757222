//! evopkg-core: Orchestration and persisted state
//!
//! Wires the backend layer together behind the [`Engine`] facade and owns
//! the state that outlives a process: configuration and the alias registry.

pub mod alias;
pub mod config;
pub mod engine;
pub mod error;

pub use alias::{Alias, AliasKind, AliasManager, SHIM_MARKER};
pub use config::EvopkgConfig;
pub use engine::{Engine, Invocation, Location, choose_backend};
pub use error::{
    CoreError, EXIT_BACKEND_FAILURE, EXIT_EVOPKG_FAILURE, EXIT_INTERRUPTED, EXIT_OK,
};
