//! Pixel agent
//!
//! The agent owns every piece of per-page state and exposes one entry point per
//! page event. Hosts forward the events named by [`PixelAgent::listeners`].
//!
//! Start-up order:
//! 1. [`PixelAgent::start`] validates configuration (failure leaves the host
//!    with nothing to bind) and emits `pageview`
//! 2. [`PixelAgent::listen`] passes each listener to the host's registration
//!    callback, then submits the one-time bootstrap call unless the API key
//!    is empty

use crate::config::{is_diagnostic, AgentConfig, ResolvedConfig};
use crate::delivery::{DeliveryChannel, Diagnostics};
use crate::error::PixelError;
use crate::host::{Capabilities, PageHost, ScriptSink};
use crate::identity::IdentityStore;
use crate::payload::PayloadBuilder;
use crate::signals::{click, lifecycle, Listener, ScrollEmitter, SessionState};
use crate::transport::Transport;
use crate::types::{ClickTarget, DeviceId, Emission, EventDetail, EventSignal};
use std::sync::Arc;
use std::time::Instant;

/// Started telemetry agent bound to one page lifetime
pub struct PixelAgent<P: PageHost> {
    page: P,
    config: ResolvedConfig,
    diagnostics: Diagnostics,
    identity: IdentityStore,
    builder: PayloadBuilder,
    channel: DeliveryChannel,
    session: SessionState,
    scroll: ScrollEmitter,
    scripts: Arc<dyn ScriptSink>,
    bootstrapped: bool,
}

impl<P: PageHost> PixelAgent<P> {
    /// Start the agent on `page`.
    ///
    /// Returns an error only for configuration problems; the host should then
    /// bind no listeners and treat telemetry as disabled.
    pub fn start(
        config: &AgentConfig,
        page: P,
        capabilities: Capabilities,
        transport: Arc<dyn Transport>,
        scripts: Arc<dyn ScriptSink>,
    ) -> Result<Self, PixelError> {
        let diagnostics = Diagnostics::new(is_diagnostic(page.location()));
        let config = match config.resolve() {
            Ok(config) => config,
            Err(e) => {
                diagnostics.report("tracking endpoint not usable; pixel stays inert", &e);
                return Err(e);
            }
        };
        diagnostics.note(&format!(
            "pixel started with tracking id {}",
            config.tracking_id
        ));

        let clock = capabilities.clock.clone();
        let mut agent = Self {
            identity: IdentityStore::new(capabilities, diagnostics),
            builder: PayloadBuilder::new(clock),
            channel: DeliveryChannel::new(&config, transport, diagnostics),
            session: SessionState::new(),
            scroll: ScrollEmitter::new(),
            page,
            config,
            diagnostics,
            scripts,
            bootstrapped: false,
        };

        agent.emit(lifecycle::pageview());

        Ok(agent)
    }

    /// Page events the host must forward
    pub fn listeners(&self) -> &'static [Listener] {
        &Listener::ALL
    }

    /// Hand every listener to `register`, then submit the bootstrap call.
    ///
    /// The bootstrap goes out at most once; later calls only re-register.
    pub fn listen(&mut self, mut register: impl FnMut(Listener)) {
        for &listener in self.listeners() {
            register(listener);
        }

        if self.bootstrapped {
            return;
        }
        self.bootstrapped = true;
        if self.config.bootstrap_enabled() {
            let device_id = self.identity.resolve();
            self.channel
                .bootstrap(&device_id, &self.config.tracking_id, self.scripts.clone());
        }
    }

    pub fn tracking_id(&self) -> &str {
        &self.config.tracking_id
    }

    pub fn is_diagnostic(&self) -> bool {
        self.diagnostics.is_enabled()
    }

    pub fn is_unloading(&self) -> bool {
        self.session.is_unloading()
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Mutable page access for hosts that own the page state
    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn device_id(&mut self) -> DeviceId {
        self.identity.resolve()
    }

    pub fn on_click(&mut self, target: &ClickTarget) {
        let emissions = click::on_click(target, self.page.location());
        self.emit_all(emissions);
    }

    pub fn on_focus(&mut self) {
        if let Some(emission) = lifecycle::on_focus(&self.session) {
            self.emit(emission);
        }
    }

    pub fn on_blur(&mut self) {
        if let Some(emission) = lifecycle::on_blur(&self.session) {
            self.emit(emission);
        }
    }

    pub fn on_before_unload(&mut self) {
        let emission = lifecycle::on_unload(&mut self.session);
        self.emit(emission);
    }

    /// Record a raw scroll; evaluation happens in [`PixelAgent::poll`]
    pub fn on_scroll(&mut self, now: Instant) {
        self.scroll.on_scroll(now);
    }

    /// Run timers that are due at `now`
    pub fn poll(&mut self, now: Instant) {
        let emissions = self
            .scroll
            .poll(now, &mut self.session, self.page.scroll());
        self.emit_all(emissions);
    }

    /// When [`PixelAgent::poll`] next has work, if ever
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scroll.next_deadline()
    }

    /// Evaluate a pending scroll without waiting for its timer
    pub fn flush(&mut self) {
        let emissions = self.scroll.flush(&mut self.session, self.page.scroll());
        self.emit_all(emissions);
    }

    /// Emit a host-defined signal; empty names are rejected locally
    pub fn track(&mut self, signal: &str, detail: EventDetail) {
        self.emit(Emission::with_detail(EventSignal::from(signal), detail));
    }

    fn emit_all(&mut self, emissions: Vec<Emission>) {
        for emission in emissions {
            self.emit(emission);
        }
    }

    fn emit(&mut self, emission: Emission) {
        if emission.signal == EventSignal::PageBlur && self.session.is_unloading() {
            return;
        }

        let Emission { signal, detail } = emission;
        match self
            .builder
            .build(&self.page, &mut self.identity, signal, detail)
        {
            Some(record) => self.channel.send(&record),
            None => self.diagnostics.note("track requires an event signal"),
        }
    }
}
