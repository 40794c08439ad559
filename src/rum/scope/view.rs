use std::collections::{BTreeMap, HashMap};

use crate::logger::SDK_LOGGER;
use crate::platform::time::{duration_nanos, Time};
use crate::rum::context::RumContext;
use crate::rum::model::{
    ActionRef, DocumentMeta, ErrorDetails, ErrorEvent, LongTaskDetails, LongTaskEvent, RumEvent,
    ViewDetails, ViewEvent,
};
use crate::rum::raw_event::{Attributes, ResourceKey, RumActionType, RumRawEvent, ViewKey};
use crate::rum::scope::{view_ref, ActionScope, ResourceScope, RumScope, ScopeIo};

/// One screen. Writes a new snapshot, with a higher document version, every time one of its
/// counters changes, and stays alive after being stopped until every child it started has
/// been written or dropped.
#[derive(Debug)]
pub struct ViewScope {
    context: RumContext,
    key: ViewKey,
    name: String,
    attributes: Attributes,
    start: Time,
    stop_nanos: Option<u64>,
    version: u64,
    action_count: u64,
    resource_count: u64,
    error_count: u64,
    crash_count: u64,
    long_task_count: u64,
    frozen_frame_count: u64,
    custom_timings: BTreeMap<String, u64>,
    pending_actions: u64,
    pending_resources: u64,
    pending_errors: u64,
    pending_long_tasks: u64,
    active_action: Option<ActionScope>,
    active_resources: HashMap<ResourceKey, ResourceScope>,
}

impl ViewScope {
    /// Creates the view and writes its first snapshot.
    pub fn start(
        parent: &RumContext,
        key: ViewKey,
        name: impl Into<String>,
        attributes: Attributes,
        time: Time,
        io: &mut ScopeIo<'_>,
    ) -> Self {
        let name = name.into();
        let context = parent.with_view(
            uuid::Uuid::new_v4().to_string(),
            name.clone(),
            key.as_str(),
        );
        let mut view = Self {
            context,
            key,
            name,
            attributes,
            start: time,
            stop_nanos: None,
            version: 0,
            action_count: 0,
            resource_count: 0,
            error_count: 0,
            crash_count: 0,
            long_task_count: 0,
            frozen_frame_count: 0,
            custom_timings: BTreeMap::new(),
            pending_actions: 0,
            pending_resources: 0,
            pending_errors: 0,
            pending_long_tasks: 0,
            active_action: None,
            active_resources: HashMap::new(),
        };
        view.send_update(time, io);
        view
    }

    pub fn key(&self) -> &ViewKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn view_id(&self) -> &str {
        self.context.view_id.as_deref().unwrap_or_default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_nanos.is_some()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_active_action(&self) -> bool {
        self.active_action.is_some()
    }

    fn is_complete(&self) -> bool {
        self.is_stopped()
            && self.active_action.is_none()
            && self.active_resources.is_empty()
            && self.pending_actions == 0
            && self.pending_resources == 0
            && self.pending_errors == 0
            && self.pending_long_tasks == 0
    }

    /// Context of events created now: includes the active action, if any.
    fn child_context(&self) -> RumContext {
        match &self.active_action {
            Some(action) => action.rum_context(),
            None => self.context.clone(),
        }
    }

    fn action_ref(context: &RumContext) -> Option<ActionRef> {
        context.action_id.clone().map(|id| ActionRef { id })
    }

    fn is_mine(&self, view_id: &str) -> bool {
        self.context.view_id.as_deref() == Some(view_id)
    }

    fn delegate_to_action(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        self.active_action = self
            .active_action
            .take()
            .and_then(|action| action.handle_event(event, io));
    }

    fn delegate_to_resource(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        let Some(key) = event.resource_key() else {
            return;
        };
        if let Some(resource) = self.active_resources.remove(key) {
            if let Some(resource) = resource.handle_event(event, io) {
                self.active_resources.insert(key.clone(), resource);
            }
        }
    }

    fn stop(&mut self, time: Time, io: &mut ScopeIo<'_>) {
        if self.is_stopped() {
            return;
        }
        self.stop_nanos = Some(time.nanos);
        self.send_update(time, io);
    }

    fn send_update(&mut self, time: Time, io: &mut ScopeIo<'_>) {
        self.version += 1;
        let end = self.stop_nanos.unwrap_or(time.nanos);
        let event = ViewEvent {
            common: io.common(&self.context, self.start.timestamp_ms, &self.attributes),
            view: ViewDetails {
                id: self.view_id().to_string(),
                name: self.name.clone(),
                url: self.key.to_string(),
                time_spent: end.saturating_sub(self.start.nanos).max(1),
                is_active: !self.is_stopped(),
                action: self.action_count.into(),
                resource: self.resource_count.into(),
                error: self.error_count.into(),
                crash: self.crash_count.into(),
                long_task: self.long_task_count.into(),
                frozen_frame: self.frozen_frame_count.into(),
                custom_timings: self.custom_timings.clone(),
            },
            meta: DocumentMeta {
                document_version: self.version,
            },
        };
        io.writer.write(RumEvent::View(event));
    }

    /// Closes the view on behalf of its session: the active action gets a chance to be
    /// written, unfinished resources are abandoned. The view is gone before the tree drains
    /// the outbox, so what the action reports is applied here, ahead of the final snapshot.
    pub(crate) fn force_close(mut self, time: Time, io: &mut ScopeIo<'_>) {
        let stop = RumRawEvent::StopView {
            key: self.key.clone(),
            attributes: Attributes::new(),
            time,
        };
        let mark = io.follow_up_mark();
        self.delegate_to_action(&stop, io);
        for follow_up in io.take_follow_ups_since(mark) {
            if follow_up_view_id(&follow_up).is_some_and(|view_id| self.is_mine(view_id)) {
                self.on_follow_up(&follow_up, io);
            } else {
                io.emit(follow_up);
            }
        }
        self.active_resources.clear();
        self.stop(time, io);
    }

    fn on_stop_view(
        &mut self,
        event: &RumRawEvent,
        key: &ViewKey,
        attributes: &Attributes,
        time: Time,
        io: &mut ScopeIo<'_>,
    ) {
        if key != &self.key || self.is_stopped() {
            return;
        }
        self.delegate_to_action(event, io);
        self.attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.stop(time, io);
    }

    fn on_start_action(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        self.delegate_to_action(event, io);
        if self.is_stopped() {
            return;
        }
        let RumRawEvent::StartAction {
            action_type,
            name,
            wait_for_stop,
            attributes,
            time,
        } = event
        else {
            return;
        };

        if *action_type == RumActionType::Custom && !*wait_for_stop {
            let action = ActionScope::new(
                &self.context,
                *action_type,
                name.clone(),
                false,
                attributes.clone(),
                *time,
                io.config,
            );
            self.pending_actions += 1;
            let send_now = RumRawEvent::SendCustomActionNow { time: *time };
            // A custom action without a stop is written right away and never becomes active.
            let _ = action.handle_event(&send_now, io);
            return;
        }

        if self.active_action.is_some() {
            SDK_LOGGER.warn(format!(
                "RUM action \"{name}\" ignored: another action is still active on view \"{}\"",
                self.name
            ));
            return;
        }
        self.active_action = Some(ActionScope::new(
            &self.context,
            *action_type,
            name.clone(),
            *wait_for_stop,
            attributes.clone(),
            *time,
            io.config,
        ));
        self.pending_actions += 1;
    }

    fn on_start_resource(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        self.delegate_to_action(event, io);
        if self.is_stopped() {
            return;
        }
        let RumRawEvent::StartResource {
            key,
            url,
            method,
            attributes,
            time,
        } = event
        else {
            return;
        };
        let resource = ResourceScope::new(
            &self.child_context(),
            key.clone(),
            url.clone(),
            *method,
            attributes.clone(),
            *time,
        );
        if self.active_resources.insert(key.clone(), resource).is_some() {
            log::warn!("RUM resource {key} started twice; the first one is discarded");
        } else {
            self.pending_resources += 1;
        }
    }

    fn on_add_error(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        let context_before = self.child_context();
        self.delegate_to_action(event, io);
        if self.is_stopped() {
            return;
        }
        let RumRawEvent::AddError {
            message,
            source,
            stack,
            is_fatal,
            attributes,
            time,
        } = event
        else {
            return;
        };
        // A crash closes the action it happened in; keep the link to it.
        let context = if *is_fatal {
            context_before
        } else {
            self.child_context()
        };
        let error = ErrorEvent {
            common: io.common(&context, time.timestamp_ms, attributes),
            view: view_ref(&context),
            action: Self::action_ref(&context),
            error: ErrorDetails {
                id: uuid::Uuid::new_v4().to_string(),
                message: message.clone(),
                source: *source,
                stack: stack.clone(),
                is_crash: *is_fatal,
                resource: None,
            },
        };

        if *is_fatal {
            // The process may not survive to handle a follow-up: count now and close the view.
            io.writer.write(RumEvent::Error(error));
            self.error_count += 1;
            self.crash_count += 1;
            self.pending_resources = self
                .pending_resources
                .saturating_sub(self.active_resources.len() as u64);
            self.active_resources.clear();
            self.stop(*time, io);
            return;
        }

        self.pending_errors += 1;
        io.writer.write(RumEvent::Error(error));
        io.emit(RumRawEvent::ErrorSent {
            view_id: self.view_id().to_string(),
            time: *time,
        });
    }

    fn on_add_long_task(
        &mut self,
        event: &RumRawEvent,
        task_nanos: u64,
        target: &str,
        time: Time,
        io: &mut ScopeIo<'_>,
    ) {
        self.delegate_to_action(event, io);
        if self.is_stopped() {
            return;
        }
        let context = self.child_context();
        let is_frozen_frame = task_nanos > duration_nanos(io.config.frozen_frame_threshold);
        let started_ms = time.timestamp_ms - (task_nanos / 1_000_000) as i64;
        let event = LongTaskEvent {
            common: io.common(&context, started_ms, &Attributes::new()),
            view: view_ref(&context),
            action: Self::action_ref(&context),
            long_task: LongTaskDetails {
                id: uuid::Uuid::new_v4().to_string(),
                duration: task_nanos,
                is_frozen_frame,
                target: target.to_string(),
            },
        };
        if is_frozen_frame {
            self.frozen_frame_count += 1;
        }
        self.pending_long_tasks += 1;
        io.writer.write(RumEvent::LongTask(event));
        io.emit(RumRawEvent::LongTaskSent {
            view_id: self.view_id().to_string(),
            time,
        });
    }

    fn on_follow_up(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        let time = event.time();
        match event {
            RumRawEvent::ActionSent { view_id, .. } if self.is_mine(view_id) => {
                self.pending_actions = self.pending_actions.saturating_sub(1);
                self.action_count += 1;
                self.send_update(time, io);
            }
            RumRawEvent::ResourceSent { view_id, .. } if self.is_mine(view_id) => {
                self.pending_resources = self.pending_resources.saturating_sub(1);
                self.resource_count += 1;
                self.send_update(time, io);
            }
            RumRawEvent::ErrorSent { view_id, .. } if self.is_mine(view_id) => {
                self.pending_errors = self.pending_errors.saturating_sub(1);
                self.error_count += 1;
                self.send_update(time, io);
            }
            RumRawEvent::LongTaskSent { view_id, .. } if self.is_mine(view_id) => {
                self.pending_long_tasks = self.pending_long_tasks.saturating_sub(1);
                self.long_task_count += 1;
                self.send_update(time, io);
            }
            RumRawEvent::ActionDropped { view_id, .. } if self.is_mine(view_id) => {
                self.pending_actions = self.pending_actions.saturating_sub(1);
            }
            RumRawEvent::ResourceDropped { view_id, .. } if self.is_mine(view_id) => {
                self.pending_resources = self.pending_resources.saturating_sub(1);
            }
            RumRawEvent::ErrorDropped { view_id, .. } if self.is_mine(view_id) => {
                self.pending_errors = self.pending_errors.saturating_sub(1);
            }
            RumRawEvent::LongTaskDropped { view_id, .. } if self.is_mine(view_id) => {
                self.pending_long_tasks = self.pending_long_tasks.saturating_sub(1);
            }
            _ => {}
        }
    }
}

fn follow_up_view_id(event: &RumRawEvent) -> Option<&str> {
    match event {
        RumRawEvent::ActionSent { view_id, .. }
        | RumRawEvent::ActionDropped { view_id, .. }
        | RumRawEvent::ResourceSent { view_id, .. }
        | RumRawEvent::ResourceDropped { view_id, .. }
        | RumRawEvent::ErrorSent { view_id, .. }
        | RumRawEvent::ErrorDropped { view_id, .. }
        | RumRawEvent::LongTaskSent { view_id, .. }
        | RumRawEvent::LongTaskDropped { view_id, .. } => Some(view_id.as_str()),
        _ => None,
    }
}

impl RumScope for ViewScope {
    fn handle_event(mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) -> Option<Self> {
        let time = event.time();
        match event {
            RumRawEvent::StartView { .. } => {
                // Another view took the screen.
                self.delegate_to_action(event, io);
                self.stop(time, io);
            }
            RumRawEvent::StopView {
                key, attributes, ..
            } => self.on_stop_view(event, key, attributes, time, io),
            RumRawEvent::StartAction { .. } => self.on_start_action(event, io),
            RumRawEvent::StartResource { .. } => self.on_start_resource(event, io),
            RumRawEvent::AddResourceTiming { .. }
            | RumRawEvent::StopResource { .. }
            | RumRawEvent::StopResourceWithError { .. } => {
                self.delegate_to_action(event, io);
                self.delegate_to_resource(event, io);
            }
            RumRawEvent::AddError { .. } => self.on_add_error(event, io),
            RumRawEvent::AddLongTask {
                duration_nanos: task_nanos,
                target,
                ..
            } => self.on_add_long_task(event, *task_nanos, target, time, io),
            RumRawEvent::AddCustomTiming { name, .. } => {
                if !self.is_stopped() {
                    self.custom_timings
                        .insert(name.clone(), time.nanos_since(&self.start));
                    self.send_update(time, io);
                }
            }
            RumRawEvent::KeepAlive { .. } => {
                self.delegate_to_action(event, io);
                if !self.is_stopped() {
                    self.send_update(time, io);
                }
            }
            RumRawEvent::StopAction { .. }
            | RumRawEvent::ViewTreeChanged { .. }
            | RumRawEvent::SendCustomActionNow { .. } => self.delegate_to_action(event, io),
            RumRawEvent::ResetSession { .. } => {}
            _ => self.on_follow_up(event, io),
        }

        if self.is_complete() {
            None
        } else {
            Some(self)
        }
    }

    fn rum_context(&self) -> RumContext {
        self.context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RumConfiguration;
    use crate::rum::raw_event::{RumErrorSource, RumResourceKind, RumResourceMethod};
    use crate::rum::scope::testing::{at, drain, Harness};
    use std::time::Duration;

    fn session_context() -> RumContext {
        RumContext::new("app").with_session("s-1")
    }

    fn start(io: &mut ScopeIo<'_>) -> ViewScope {
        ViewScope::start(
            &session_context(),
            "home".into(),
            "Home",
            Attributes::new(),
            at(0),
            io,
        )
    }

    /// Feeds `event`, then every follow-up it produced, the way the application scope does.
    fn feed(view: ViewScope, event: RumRawEvent, io: &mut ScopeIo<'_>) -> Option<ViewScope> {
        let mut view = view.handle_event(&event, io);
        while let Some(follow_up) = io.next_follow_up() {
            view = view?.handle_event(&follow_up, io);
        }
        view
    }

    fn stop_view(ms: u64) -> RumRawEvent {
        RumRawEvent::StopView {
            key: "home".into(),
            attributes: Attributes::new(),
            time: at(ms),
        }
    }

    fn last_view(h: &Harness) -> serde_json::Value {
        h.written_of("view").pop().unwrap()
    }

    #[test]
    fn every_snapshot_bumps_document_version() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let view = start(&mut io);
        assert_eq!(view.version(), 1);

        let view = feed(view, RumRawEvent::KeepAlive { time: at(100) }, &mut io).unwrap();
        let timing = RumRawEvent::AddCustomTiming {
            name: "first_paint".into(),
            time: at(250),
        };
        let view = feed(view, timing, &mut io).unwrap();
        assert_eq!(view.version(), 3);

        let versions: Vec<u64> = h
            .written_of("view")
            .iter()
            .map(|v| v["_dd"]["document_version"].as_u64().unwrap())
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(
            last_view(&h)["view"]["custom_timings"]["first_paint"],
            250_000_000u64
        );

        assert!(feed(view, stop_view(400), &mut io).is_none());
        let last = last_view(&h);
        assert_eq!(last["view"]["is_active"], false);
        assert_eq!(last["view"]["time_spent"], 400_000_000u64);
    }

    #[test]
    fn stop_waits_for_pending_resource() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let view = start(&mut io);

        let start_resource = RumRawEvent::StartResource {
            key: "img".into(),
            url: "https://example.com/a.png".into(),
            method: RumResourceMethod::Get,
            attributes: Attributes::new(),
            time: at(10),
        };
        let view = feed(view, start_resource, &mut io).unwrap();
        let view = feed(view, stop_view(50), &mut io).expect("waits for the resource");
        assert!(view.is_stopped());

        let stop_resource = RumRawEvent::StopResource {
            key: "img".into(),
            status_code: Some(200),
            size: Some(10),
            kind: RumResourceKind::Image,
            attributes: Attributes::new(),
            time: at(90),
        };
        assert!(feed(view, stop_resource, &mut io).is_none());

        assert_eq!(h.written_of("resource").len(), 1);
        let last = last_view(&h);
        assert_eq!(last["view"]["resource"]["count"], 1);
        assert_eq!(last["view"]["time_spent"], 50_000_000u64);
    }

    #[test]
    fn errors_are_counted_once_written() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let view = start(&mut io);

        let error = RumRawEvent::AddError {
            message: "oops".into(),
            source: RumErrorSource::Logger,
            stack: None,
            is_fatal: false,
            attributes: Attributes::new(),
            time: at(5),
        };
        let view = feed(view, error, &mut io).unwrap();
        assert!(!view.is_stopped());
        assert_eq!(last_view(&h)["view"]["error"]["count"], 1);
        assert_eq!(h.written_of("error")[0]["error"]["is_crash"], false);
    }

    #[test]
    fn fatal_error_closes_view_with_crash() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let view = start(&mut io);
        let action = RumRawEvent::StartAction {
            action_type: RumActionType::Tap,
            name: "pay".into(),
            wait_for_stop: false,
            attributes: Attributes::new(),
            time: at(1),
        };
        let view = feed(view, action, &mut io).unwrap();

        let crash = RumRawEvent::AddError {
            message: "panic".into(),
            source: RumErrorSource::Source,
            stack: Some("at main".into()),
            is_fatal: true,
            attributes: Attributes::new(),
            time: at(20),
        };
        assert!(feed(view, crash, &mut io).is_none());

        let last = last_view(&h);
        assert_eq!(last["view"]["crash"]["count"], 1);
        assert_eq!(last["view"]["action"]["count"], 1);
        assert_eq!(last["view"]["is_active"], false);
        let error = &h.written_of("error")[0];
        assert_eq!(error["error"]["is_crash"], true);
        assert!(error["action"]["id"].is_string());
    }

    #[test]
    fn dropped_action_does_not_block_completion() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let view = start(&mut io);
        let action = RumRawEvent::StartAction {
            action_type: RumActionType::Tap,
            name: "noop".into(),
            wait_for_stop: false,
            attributes: Attributes::new(),
            time: at(1),
        };
        let view = feed(view, action, &mut io).unwrap();
        assert!(view.has_active_action());

        assert!(feed(view, stop_view(500), &mut io).is_none());
        assert!(h.written_of("action").is_empty());
        assert_eq!(last_view(&h)["view"]["action"]["count"], 0);
    }

    #[test]
    fn custom_action_without_stop_is_written_immediately() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let view = start(&mut io);
        let action = RumRawEvent::StartAction {
            action_type: RumActionType::Custom,
            name: "purchase".into(),
            wait_for_stop: false,
            attributes: Attributes::new(),
            time: at(3),
        };
        let view = feed(view, action, &mut io).unwrap();

        assert!(!view.has_active_action());
        assert_eq!(h.written_of("action").len(), 1);
        assert_eq!(last_view(&h)["view"]["action"]["count"], 1);
    }

    #[test]
    fn force_close_counts_the_action_it_writes() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let view = start(&mut io);
        let action = RumRawEvent::StartAction {
            action_type: RumActionType::Custom,
            name: "checkout".into(),
            wait_for_stop: true,
            attributes: Attributes::new(),
            time: at(2),
        };
        let view = feed(view, action, &mut io).unwrap();
        assert!(view.has_active_action());

        view.force_close(at(50), &mut io);

        assert_eq!(h.written_of("action").len(), 1);
        let closed = last_view(&h);
        assert_eq!(closed["view"]["action"]["count"], 1);
        assert_eq!(closed["view"]["is_active"], false);
        assert!(drain(&mut io).is_empty());
    }

    #[test]
    fn long_tasks_above_threshold_are_frozen_frames() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let view = start(&mut io);
        let long_task = |ms: u64, duration: Duration| RumRawEvent::AddLongTask {
            duration_nanos: duration.as_nanos() as u64,
            target: "main".into(),
            time: at(ms),
        };

        let view = feed(view, long_task(1_000, Duration::from_millis(200)), &mut io).unwrap();
        let _view = feed(view, long_task(3_000, Duration::from_millis(900)), &mut io).unwrap();

        let tasks = h.written_of("long_task");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0]["long_task"]["is_frozen_frame"], false);
        assert_eq!(tasks[1]["long_task"]["is_frozen_frame"], true);
        assert_eq!(tasks[1]["date"], 1_700_000_000_000i64 + 2_100);
        let last = last_view(&h);
        assert_eq!(last["view"]["long_task"]["count"], 2);
        assert_eq!(last["view"]["frozen_frame"]["count"], 1);
    }
}
