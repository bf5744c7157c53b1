//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use crate::error::{BenchError, BenchResult};
use crate::interrupt::Interrupt;
use crate::profiles::Profiles;
use crate::traits::DatabaseClient;

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator
///
/// # Example
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .client(client)
///     .interrupt(interrupt.clone())
///     .profiles(profiles)
///     .lite(true)
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    client: Option<Arc<dyn DatabaseClient>>,
    interrupt: Interrupt,
    profiles: Profiles,
    lite: bool,
}

impl OrchestratorBuilder {
    /// Create a builder with no profiles and verbose output
    pub fn new() -> Self {
        Self {
            client: None,
            interrupt: Interrupt::new(),
            profiles: Profiles::new(),
            lite: false,
        }
    }

    /// Set the database client
    pub fn client(mut self, client: Arc<dyn DatabaseClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Share an interrupt token with the orchestrator
    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Set the shared settings profiles
    pub fn profiles(mut self, profiles: Profiles) -> Self {
        self.profiles = profiles;
        self
    }

    /// Whether results will be rendered in lite mode
    pub fn lite(mut self, lite: bool) -> Self {
        self.lite = lite;
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if no client was set.
    pub fn build(self) -> BenchResult<Orchestrator> {
        let client = self
            .client
            .ok_or_else(|| BenchError::missing_config("client"))?;

        Ok(Orchestrator::new(
            client,
            self.interrupt,
            self.profiles,
            self.lite,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
