//! Application core — command submission, dispatch and events.
//!
//! Callers talk to [`api::JvApi`]; the [`dispatcher::Dispatcher`] executes
//! the queued work against the collaborators defined in [`ports`].  Build
//! both halves together with [`build`].

pub mod api;
pub mod channels;
pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod ports;

use std::sync::Arc;

use crate::config::{ConfigError, JvConfig};

use self::api::JvApi;
use self::channels::Shared;
use self::dispatcher::Dispatcher;
use self::ports::{
    NoSecurity, NullDiscovery, NullPowerPolicy, PowerPolicy, SecurityQuery, ServiceDiscovery,
    Transport,
};

/// Collaborators the core is wired to.
pub struct Stack {
    pub transport: Box<dyn Transport>,
    pub discovery: Box<dyn ServiceDiscovery>,
    pub power: Box<dyn PowerPolicy>,
    pub security: Arc<dyn SecurityQuery>,
}

impl Stack {
    /// `transport` with null discovery, power and security collaborators.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            discovery: Box::new(NullDiscovery),
            power: Box::new(NullPowerPolicy),
            security: Arc::new(NoSecurity),
        }
    }

    #[must_use]
    pub fn with_discovery(mut self, discovery: impl ServiceDiscovery + 'static) -> Self {
        self.discovery = Box::new(discovery);
        self
    }

    #[must_use]
    pub fn with_power(mut self, power: impl PowerPolicy + 'static) -> Self {
        self.power = Box::new(power);
        self
    }

    #[must_use]
    pub fn with_security(mut self, security: impl SecurityQuery + 'static) -> Self {
        self.security = Arc::new(security);
        self
    }
}

/// Create the caller API and its dispatcher.  The dispatcher must be driven
/// (`process_pending`, `run` or `spawn`) for any event to be delivered.
pub fn build(config: JvConfig, stack: Stack) -> Result<(JvApi, Dispatcher), ConfigError> {
    config.validate()?;
    let shared = Arc::new(Shared::new(stack.security));
    let api = JvApi::new(shared.clone(), &config);
    let dispatcher = Dispatcher::new(
        shared,
        config,
        stack.transport,
        stack.discovery,
        stack.power,
    );
    Ok((api, dispatcher))
}
