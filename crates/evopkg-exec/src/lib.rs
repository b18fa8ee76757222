//! evopkg-exec: Process dispatch
//!
//! The only place in evopkg that starts external processes. Everything else
//! builds a [`Command`] and hands it to a [`Dispatcher`].

pub mod command;
pub mod error;
pub mod interrupt;
pub mod local;
pub mod result;
pub mod traits;

pub use command::{Command, OutputMode};
pub use error::ExecError;
pub use interrupt::Interrupt;
pub use local::LocalDispatcher;
pub use result::CommandResult;
pub use traits::Dispatcher;
