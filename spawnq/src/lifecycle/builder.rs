use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use tracing::Span;

use crate::config::SpawnerConfig;
use crate::events::{InProcEventBus, LifecycleEventPublisher, NoopEventPublisher};
use crate::lifecycle::Orchestrator;
use crate::lifecycle::spawner::Spawner;
use crate::observation::ObservationCache;
use crate::persistence::ProxyInfoStore;

/// Builder for a [`Spawner`] with explicit collaborators.
///
/// The orchestrator and the proxy info store are required. Events default to
/// a publisher that drops everything, and the span to a `spawnq.spawner`
/// span carrying the namespace.
///
/// # Example
///
/// ```ignore
/// use spawnq::*;
///
/// let spawner = SpawnerBuilder::new(SpawnerConfig::default())
///     .with_orchestrator(orchestrator)
///     .with_proxy_store(store)
///     .with_events(bus)
///     .build()?;
/// ```
pub struct SpawnerBuilder<O, P>
where
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    config: SpawnerConfig,
    orchestrator: Option<Arc<O>>,
    proxy_store: Option<Arc<P>>,
    events: Option<Arc<dyn LifecycleEventPublisher>>,
    observations: Option<ObservationCache>,
    span: Option<Span>,
}

impl<O, P> fmt::Debug for SpawnerBuilder<O, P>
where
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("SpawnerBuilder");
        debug.field("config", &self.config);
        debug.field("orchestrator_set", &self.orchestrator.is_some());
        debug.field("proxy_store_set", &self.proxy_store.is_some());
        debug.field("events_set", &self.events.is_some());
        debug.field("observations_set", &self.observations.is_some());

        if self.orchestrator.is_some() {
            debug.field("orchestrator_type", &type_name::<O>());
        }
        if self.proxy_store.is_some() {
            debug.field("proxy_store_type", &type_name::<P>());
        }

        debug.finish()
    }
}

impl<O, P> SpawnerBuilder<O, P>
where
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    pub fn new(config: SpawnerConfig) -> Self {
        Self {
            config,
            orchestrator: None,
            proxy_store: None,
            events: None,
            observations: None,
            span: None,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<O>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_proxy_store(mut self, proxy_store: Arc<P>) -> Self {
        self.proxy_store = Some(proxy_store);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn LifecycleEventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Publish to a new [`InProcEventBus`] sized by the config's
    /// `event_capacity`. Returns the bus so callers can subscribe.
    pub fn with_event_bus(mut self) -> (Self, Arc<InProcEventBus>) {
        let bus = Arc::new(InProcEventBus::new(self.config.event_capacity));
        self.events = Some(bus.clone());
        (self, bus)
    }

    /// Share an observation cache with another spawner or with the caller.
    pub fn with_observations(mut self, observations: ObservationCache) -> Self {
        self.observations = Some(observations);
        self
    }

    /// Parent span for every operation and watcher of the spawner.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build the spawner.
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator or the proxy info store is missing.
    pub fn build(self) -> anyhow::Result<Spawner<O, P>> {
        let orchestrator = self
            .orchestrator
            .ok_or_else(|| anyhow::anyhow!("orchestrator dependency missing"))?;
        let proxy_store = self
            .proxy_store
            .ok_or_else(|| anyhow::anyhow!("proxy_store dependency missing"))?;
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(NoopEventPublisher) as Arc<dyn LifecycleEventPublisher>);
        let observations = self.observations.unwrap_or_default();
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("spawnq.spawner", namespace = %self.config.namespace)
        });

        Ok(Spawner::new(
            self.config,
            orchestrator,
            proxy_store,
            events,
            observations,
            span,
        ))
    }
}
