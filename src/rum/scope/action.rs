use std::collections::HashMap;

use crate::core::config::RumConfiguration;
use crate::logger::SDK_LOGGER;
use crate::platform::time::{duration_nanos, Time};
use crate::rum::context::RumContext;
use crate::rum::model::{ActionDetails, ActionEvent, ActionTarget, RumEvent};
use crate::rum::raw_event::{Attributes, ResourceKey, RumActionType, RumRawEvent};
use crate::rum::scope::{view_ref, RumScope, ScopeIo};

/// One user action, from its start until it is written or dropped.
///
/// Every incoming event is first checked against the closing rules, in this order: inactivity
/// with nothing left to wait for, then the maximum duration, then an explicit "send now". Only
/// when none applies is the event itself recorded.
#[derive(Debug)]
pub struct ActionScope {
    context: RumContext,
    action_id: String,
    action_type: RumActionType,
    name: String,
    attributes: Attributes,
    start: Time,
    last_interaction_nanos: u64,
    wait_for_stop: bool,
    stopped: bool,
    sent: bool,
    resource_count: u64,
    error_count: u64,
    crash_count: u64,
    long_task_count: u64,
    view_tree_change_count: u64,
    /// Resources started under this action, with their start time. Entries older than the
    /// configured TTL stop counting so a resource that is never stopped cannot hold the action.
    ongoing_resources: HashMap<ResourceKey, u64>,
    inactivity_nanos: u64,
    max_duration_nanos: u64,
    resource_ttl_nanos: u64,
}

impl ActionScope {
    pub fn new(
        parent: &RumContext,
        action_type: RumActionType,
        name: impl Into<String>,
        wait_for_stop: bool,
        attributes: Attributes,
        start: Time,
        config: &RumConfiguration,
    ) -> Self {
        Self {
            context: parent.clone(),
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type,
            name: name.into(),
            attributes,
            start,
            last_interaction_nanos: start.nanos,
            wait_for_stop,
            stopped: false,
            sent: false,
            resource_count: 0,
            error_count: 0,
            crash_count: 0,
            long_task_count: 0,
            view_tree_change_count: 0,
            ongoing_resources: HashMap::new(),
            inactivity_nanos: duration_nanos(config.action_inactivity),
            max_duration_nanos: duration_nanos(config.action_max_duration),
            resource_ttl_nanos: duration_nanos(config.ongoing_resource_ttl),
        }
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    fn has_side_effects(&self) -> bool {
        self.resource_count
            + self.error_count
            + self.view_tree_change_count
            + self.long_task_count
            > 0
    }

    fn can_be_sent(&self) -> bool {
        self.has_side_effects() || self.action_type == RumActionType::Custom
    }

    fn purge_stale_resources(&mut self, now: u64) {
        let ttl = self.resource_ttl_nanos;
        self.ongoing_resources
            .retain(|_, started| now.saturating_sub(*started) <= ttl);
    }

    fn mark_interaction(&mut self, now: u64) {
        self.last_interaction_nanos = now;
    }

    /// Writes the action, or reports it dropped, exactly once.
    fn send(&mut self, end_nanos: u64, time: Time, io: &mut ScopeIo<'_>) {
        if self.sent {
            return;
        }
        self.sent = true;
        let view_id = self.context.view_id.clone().unwrap_or_default();

        if !self.can_be_sent() {
            SDK_LOGGER.debug(format!(
                "RUM action \"{}\" dropped: it had no side effect",
                self.name
            ));
            io.emit(RumRawEvent::ActionDropped { view_id, time });
            return;
        }

        let context = self.rum_context();
        let event = ActionEvent {
            common: io.common(&context, self.start.timestamp_ms, &self.attributes),
            view: view_ref(&context),
            action: ActionDetails {
                id: self.action_id.clone(),
                action_type: self.action_type,
                target: ActionTarget {
                    name: self.name.clone(),
                },
                loading_time: end_nanos.saturating_sub(self.start.nanos).max(1),
                resource: self.resource_count.into(),
                error: self.error_count.into(),
                crash: self.crash_count.into(),
                long_task: self.long_task_count.into(),
            },
        };
        io.writer.write(RumEvent::Action(event));
        io.emit(RumRawEvent::ActionSent { view_id, time });
    }

    fn record(&mut self, event: &RumRawEvent, now: u64, io: &mut ScopeIo<'_>) {
        match event {
            RumRawEvent::SendCustomActionNow { time } => {
                self.send(self.last_interaction_nanos, *time, io);
            }
            RumRawEvent::StartView { time, .. } | RumRawEvent::StopView { time, .. } => {
                self.ongoing_resources.clear();
                self.send(now, *time, io);
            }
            RumRawEvent::StopAction {
                action_type,
                name,
                attributes,
                ..
            } => {
                if let Some(action_type) = action_type {
                    self.action_type = *action_type;
                }
                if let Some(name) = name {
                    self.name = name.clone();
                }
                self.attributes
                    .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.stopped = true;
                self.mark_interaction(now);
            }
            RumRawEvent::StartResource { key, .. } => {
                self.mark_interaction(now);
                self.resource_count += 1;
                self.ongoing_resources.insert(key.clone(), now);
            }
            RumRawEvent::StopResource { key, .. } => {
                if self.ongoing_resources.remove(key).is_some() {
                    self.mark_interaction(now);
                }
            }
            RumRawEvent::StopResourceWithError { key, .. } => {
                if self.ongoing_resources.remove(key).is_some() {
                    self.mark_interaction(now);
                    self.resource_count = self.resource_count.saturating_sub(1);
                    self.error_count += 1;
                }
            }
            RumRawEvent::AddError { is_fatal, time, .. } => {
                self.mark_interaction(now);
                self.error_count += 1;
                if *is_fatal {
                    self.crash_count += 1;
                    self.send(self.last_interaction_nanos, *time, io);
                }
            }
            RumRawEvent::AddLongTask { .. } => {
                self.mark_interaction(now);
                self.long_task_count += 1;
            }
            RumRawEvent::ViewTreeChanged { .. } => {
                self.mark_interaction(now);
                self.view_tree_change_count += 1;
            }
            _ => {}
        }
    }
}

impl RumScope for ActionScope {
    fn handle_event(mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) -> Option<Self> {
        let time = event.time();
        let now = time.nanos;
        self.purge_stale_resources(now);

        let inactive = now.saturating_sub(self.last_interaction_nanos) > self.inactivity_nanos;
        let too_long = now.saturating_sub(self.start.nanos) > self.max_duration_nanos;
        let waiting_for_stop = self.wait_for_stop && !self.stopped;
        let should_stop = inactive && self.ongoing_resources.is_empty() && !waiting_for_stop;

        if should_stop {
            self.send(self.last_interaction_nanos, time, io);
        } else if too_long {
            self.send(now, time, io);
        } else {
            self.record(event, now, io);
        }

        (!self.sent).then_some(self)
    }

    fn rum_context(&self) -> RumContext {
        self.context.with_action(&self.action_id)
    }
}
