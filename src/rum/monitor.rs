use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::config::RumConfiguration;
use crate::core::first_party::FirstPartyHostDetector;
use crate::core::user_info::UserInfoProvider;
use crate::logger::SDK_LOGGER;
use crate::persistence::{DataWriter, ImmediateWriter};
use crate::platform::time::TimeProvider;
use crate::platform::worker::{SingleWorker, WorkerTask};
use crate::rum::constants::MONITOR_QUEUE_CAPACITY;
use crate::rum::context::RumContext;
use crate::rum::model::RumEvent;
use crate::rum::raw_event::{
    Attributes, ResourceKey, ResourceTiming, RumActionType, RumErrorSource, RumRawEvent,
    RumResourceKind, RumResourceMethod, ViewKey,
};
use crate::rum::scope::{ApplicationScope, RateBasedSampler, Sampler, ScopeIo};

enum MonitorCommand {
    Event(RumRawEvent),
    AddAttribute(String, Value),
    RemoveAttribute(String),
    Drain(mpsc::Sender<()>),
}

struct MonitorState {
    scope: Mutex<ApplicationScope>,
    writer: Arc<dyn DataWriter<RumEvent>>,
    config: RumConfiguration,
    user_info: Arc<UserInfoProvider>,
    first_party: FirstPartyHostDetector,
    attributes: Mutex<Attributes>,
    current_context: RwLock<RumContext>,
}

impl MonitorState {
    fn process(&self, event: &RumRawEvent) {
        let mut scope = self.scope.lock().unwrap_or_else(PoisonError::into_inner);
        let attributes = self
            .attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.process_locked(&mut scope, self.writer.as_ref(), &attributes, event);
    }

    fn process_locked(
        &self,
        scope: &mut ApplicationScope,
        writer: &dyn DataWriter<RumEvent>,
        attributes: &Attributes,
        event: &RumRawEvent,
    ) {
        let mut io = ScopeIo::new(
            writer,
            &self.config,
            self.user_info.snapshot(),
            attributes,
            &self.first_party,
        );
        scope.process(event, &mut io);
        *self
            .current_context
            .write()
            .unwrap_or_else(PoisonError::into_inner) = scope.current_context();
    }
}

struct MonitorTask {
    state: Arc<MonitorState>,
    time: Arc<dyn TimeProvider>,
    keep_alive: Duration,
}

#[async_trait]
impl WorkerTask for MonitorTask {
    type Message = MonitorCommand;

    async fn on_message(&mut self, message: MonitorCommand) -> Option<Duration> {
        match message {
            MonitorCommand::Event(event) => self.state.process(&event),
            MonitorCommand::AddAttribute(key, value) => {
                self.state
                    .attributes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, value);
            }
            MonitorCommand::RemoveAttribute(key) => {
                self.state
                    .attributes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
            }
            MonitorCommand::Drain(done) => {
                let _ = done.send(());
            }
        }
        Some(self.keep_alive)
    }

    async fn on_idle(&mut self) -> Option<Duration> {
        let event = RumRawEvent::KeepAlive {
            time: self.time.now(),
        };
        self.state.process(&event);
        Some(self.keep_alive)
    }
}

/// Entry point of the RUM feature.
///
/// Every call captures the current time and hands a raw event to the monitor's worker without
/// waiting: the scope tree is only ever touched from that worker, one event at a time, in
/// submission order. When the queue is full the event is dropped.
pub struct RumMonitor {
    state: Arc<MonitorState>,
    time: Arc<dyn TimeProvider>,
    worker: Option<SingleWorker<MonitorCommand>>,
}

impl std::fmt::Debug for RumMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RumMonitor")
            .field("application_id", &self.state.config.application_id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl RumMonitor {
    pub fn new(
        config: RumConfiguration,
        writer: Arc<dyn DataWriter<RumEvent>>,
        user_info: Arc<UserInfoProvider>,
        first_party: FirstPartyHostDetector,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let sampler = Box::new(RateBasedSampler::new(config.sample_rate));
        Self::with_sampler(config, writer, user_info, first_party, time, sampler)
    }

    pub fn with_sampler(
        config: RumConfiguration,
        writer: Arc<dyn DataWriter<RumEvent>>,
        user_info: Arc<UserInfoProvider>,
        first_party: FirstPartyHostDetector,
        time: Arc<dyn TimeProvider>,
        sampler: Box<dyn Sampler>,
    ) -> Self {
        let keep_alive = config.keep_alive;
        let state = Arc::new(MonitorState {
            scope: Mutex::new(ApplicationScope::new(
                config.application_id.clone(),
                sampler,
            )),
            current_context: RwLock::new(RumContext::new(config.application_id.clone())),
            writer,
            config,
            user_info,
            first_party,
            attributes: Mutex::new(Attributes::new()),
        });
        let task = MonitorTask {
            state: Arc::clone(&state),
            time: Arc::clone(&time),
            keep_alive,
        };
        let worker = match SingleWorker::spawn(
            "rum-sdk-monitor",
            MONITOR_QUEUE_CAPACITY,
            Some(keep_alive),
            task,
        ) {
            Ok(worker) => Some(worker),
            Err(err) => {
                log::error!("could not start the RUM monitor worker: {err}");
                SDK_LOGGER.error("RUM is disabled: the monitor could not be started");
                None
            }
        };
        Self {
            state,
            time,
            worker,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_shut_down())
    }

    pub fn application_id(&self) -> &str {
        &self.state.config.application_id
    }

    /// Context of the view on screen as of the last processed event. Used to correlate logs.
    pub fn current_context(&self) -> RumContext {
        self.state
            .current_context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn submit(&self, command: MonitorCommand) -> bool {
        match &self.worker {
            Some(worker) => worker.submit(command),
            None => false,
        }
    }

    /// Submits an already-built event. Returns `false` when it was dropped.
    pub fn handle_event(&self, event: RumRawEvent) -> bool {
        self.submit(MonitorCommand::Event(event))
    }

    pub fn start_view(
        &self,
        key: impl Into<ViewKey>,
        name: impl Into<String>,
        attributes: Attributes,
    ) {
        self.handle_event(RumRawEvent::StartView {
            key: key.into(),
            name: name.into(),
            attributes,
            time: self.time.now(),
        });
    }

    pub fn stop_view(&self, key: impl Into<ViewKey>, attributes: Attributes) {
        self.handle_event(RumRawEvent::StopView {
            key: key.into(),
            attributes,
            time: self.time.now(),
        });
    }

    /// Records an action that has no explicit end. Its duration is decided by the activity it
    /// triggers.
    pub fn add_action(
        &self,
        action_type: RumActionType,
        name: impl Into<String>,
        attributes: Attributes,
    ) {
        self.handle_event(RumRawEvent::StartAction {
            action_type,
            name: name.into(),
            wait_for_stop: false,
            attributes,
            time: self.time.now(),
        });
    }

    /// Starts a continuous action (scroll, swipe) that lasts until [`stop_action`].
    ///
    /// [`stop_action`]: RumMonitor::stop_action
    pub fn start_action(
        &self,
        action_type: RumActionType,
        name: impl Into<String>,
        attributes: Attributes,
    ) {
        self.handle_event(RumRawEvent::StartAction {
            action_type,
            name: name.into(),
            wait_for_stop: true,
            attributes,
            time: self.time.now(),
        });
    }

    /// Stops the active action. `action_type` and `name`, when given, replace the ones it was
    /// started with.
    pub fn stop_action(
        &self,
        action_type: Option<RumActionType>,
        name: Option<String>,
        attributes: Attributes,
    ) {
        self.handle_event(RumRawEvent::StopAction {
            action_type,
            name,
            attributes,
            time: self.time.now(),
        });
    }

    pub fn start_resource(
        &self,
        key: impl Into<ResourceKey>,
        method: RumResourceMethod,
        url: impl Into<String>,
        attributes: Attributes,
    ) {
        self.handle_event(RumRawEvent::StartResource {
            key: key.into(),
            url: url.into(),
            method,
            attributes,
            time: self.time.now(),
        });
    }

    pub fn add_resource_timing(&self, key: impl Into<ResourceKey>, timing: ResourceTiming) {
        self.handle_event(RumRawEvent::AddResourceTiming {
            key: key.into(),
            timing,
            time: self.time.now(),
        });
    }

    pub fn stop_resource(
        &self,
        key: impl Into<ResourceKey>,
        status_code: Option<u16>,
        size: Option<u64>,
        kind: RumResourceKind,
        attributes: Attributes,
    ) {
        self.handle_event(RumRawEvent::StopResource {
            key: key.into(),
            status_code,
            size,
            kind,
            attributes,
            time: self.time.now(),
        });
    }

    pub fn stop_resource_with_error(
        &self,
        key: impl Into<ResourceKey>,
        status_code: Option<u16>,
        message: impl Into<String>,
        source: RumErrorSource,
        stack: Option<String>,
        attributes: Attributes,
    ) {
        self.handle_event(RumRawEvent::StopResourceWithError {
            key: key.into(),
            status_code,
            message: message.into(),
            source,
            stack,
            attributes,
            time: self.time.now(),
        });
    }

    pub fn add_error(
        &self,
        message: impl Into<String>,
        source: RumErrorSource,
        stack: Option<String>,
        attributes: Attributes,
    ) {
        self.handle_event(RumRawEvent::AddError {
            message: message.into(),
            source,
            stack,
            is_fatal: false,
            attributes,
            time: self.time.now(),
        });
    }

    pub fn add_long_task(&self, duration: Duration, target: impl Into<String>) {
        self.handle_event(RumRawEvent::AddLongTask {
            duration_nanos: duration.as_nanos().min(u64::MAX as u128) as u64,
            target: target.into(),
            time: self.time.now(),
        });
    }

    /// Adds a named timing, measured from the start of the active view.
    pub fn add_timing(&self, name: impl Into<String>) {
        self.handle_event(RumRawEvent::AddCustomTiming {
            name: name.into(),
            time: self.time.now(),
        });
    }

    pub fn view_tree_changed(&self) {
        self.handle_event(RumRawEvent::ViewTreeChanged {
            time: self.time.now(),
        });
    }

    pub fn reset_session(&self) {
        self.handle_event(RumRawEvent::ResetSession {
            time: self.time.now(),
        });
    }

    /// Adds a global attribute to every event emitted after the ones already submitted.
    pub fn add_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.submit(MonitorCommand::AddAttribute(key.into(), value.into()));
    }

    pub fn remove_attribute(&self, key: impl Into<String>) {
        self.submit(MonitorCommand::RemoveAttribute(key.into()));
    }

    /// Handles a fatal error on the calling thread and writes the result before returning.
    ///
    /// Meant for the crash path: never waits for the worker. Returns `false` without doing
    /// anything when the worker is in the middle of an event.
    pub fn process_fatal_error_now(
        &self,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> bool {
        let mut scope = match self.state.scope.try_lock() {
            Ok(scope) => scope,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                log::warn!("RUM scope busy, fatal error not recorded");
                return false;
            }
        };
        let attributes = match self.state.attributes.try_lock() {
            Ok(attributes) => attributes.clone(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().clone(),
            Err(TryLockError::WouldBlock) => Attributes::new(),
        };
        let event = RumRawEvent::AddError {
            message: message.into(),
            source: RumErrorSource::Source,
            stack,
            is_fatal: true,
            attributes: Attributes::new(),
            time: self.time.now(),
        };
        let writer = ImmediateWriter(self.state.writer.as_ref());
        self.state
            .process_locked(&mut scope, &writer, &attributes, &event);
        true
    }

    /// Blocks until every event submitted before this call has been processed. Returns `false`
    /// when the monitor is not running.
    pub fn drain(&self) -> bool {
        let (done, wait) = mpsc::channel();
        if !self.submit(MonitorCommand::Drain(done)) {
            return false;
        }
        wait.recv().is_ok()
    }

    /// Processes the queued events, then stops the worker. Later calls are ignored.
    pub fn shutdown(&self) {
        if let Some(worker) = &self.worker {
            worker.shutdown();
        }
    }
}
