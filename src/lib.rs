//! Command façade for multiplexed serial-port connections over an
//! RFCOMM-style transport.
//!
//! Callers submit commands through [`JvApi`]; a single [`Dispatcher`]
//! executes them in order against the transport and reports results as
//! [`JvEvent`]s on registered callbacks.  Connections are addressed by
//! packed [`Handle`]s into a fixed-size resource table.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod handle;
pub mod power;
pub mod table;
pub mod types;
pub mod validator;

pub use app::api::{ConnectParams, JvApi, ServerParams};
pub use app::dispatcher::Dispatcher;
pub use app::events::{CloseReason, JvEvent};
pub use app::{Stack, build};
pub use config::JvConfig;
pub use error::JvError;
pub use handle::Handle;
