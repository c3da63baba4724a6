//! The event bus: ordered registrations and fault-isolating dispatch.
//!
//! Registrations are kept sorted by ascending [`Priority`]; equal priorities
//! keep insertion order. A post walks a snapshot of that list, so listeners may
//! register or post re-entrantly while a dispatch is running. New
//! registrations only take effect on the next post.
//!
//! Threading: the bus is `Send + Sync` so it can be shared through `Arc`, but
//! registration and posting for one mod are expected to come from a single
//! caller at a time.

use crate::error::{EventError, ListenerError, ListenerResult};
use crate::event::{both, Event, EventFilter};
use crate::exception::{ExceptionHandler, LoggingExceptionHandler};
use crate::listener::{DeclaredListener, Listener, ListenerAdapter};
use parking_lot::{Mutex, RwLock};
use std::any::{type_name, Any};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, trace_span, warn};

/// Listener priority; lower values fire first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const HIGHEST: Priority = Priority(-200);
    pub const HIGH: Priority = Priority(-100);
    pub const NORMAL: Priority = Priority(0);
    pub const LOW: Priority = Priority(100);
    pub const LOWEST: Priority = Priority(200);
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Identity of a single registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

/// A listener registered on a bus.
pub struct Registration {
    id: RegistrationId,
    priority: Priority,
    filter: EventFilter,
    listener: Listener,
}

impl Registration {
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Whether this registration receives `event`.
    pub fn accepts(&self, event: &dyn Event) -> bool {
        (self.filter)(event)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("listener", &self.listener)
            .finish()
    }
}

/// Stage-ending failure latched by a listener returning [`ListenerError::AbortStage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageAbort {
    pub reason: String,
    pub listener: String,
    pub event: &'static str,
}

/// Counters for bus activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    pub events_posted: u64,
    pub listeners_invoked: u64,
    pub listener_failures: u64,
    pub stage_aborts: u64,
}

/// Outcome of a single post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Builder for [`EventBus`].
pub struct EventBusBuilder {
    name: String,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
    track_phases: bool,
}

impl EventBusBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    /// Emits a trace span per listener invocation when enabled.
    pub fn track_phases(mut self, track_phases: bool) -> Self {
        self.track_phases = track_phases;
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            name: self.name,
            registrations: RwLock::new(Vec::new()),
            exception_handler: self
                .exception_handler
                .unwrap_or_else(|| Arc::new(LoggingExceptionHandler)),
            track_phases: self.track_phases,
            abort: Mutex::new(None),
            stats: Mutex::new(BusStats::default()),
            next_id: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Ordered, fault-isolating publish mechanism.
pub struct EventBus {
    name: String,
    registrations: RwLock<Vec<Arc<Registration>>>,
    exception_handler: Arc<dyn ExceptionHandler>,
    track_phases: bool,
    abort: Mutex<Option<StageAbort>>,
    stats: Mutex<BusStats>,
    next_id: AtomicU64,
    shutdown: AtomicBool,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("registrations", &self.registrations.read().len())
            .field("track_phases", &self.track_phases)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder {
            name: "default".to_string(),
            exception_handler: None,
            track_phases: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn track_phases(&self) -> bool {
        self.track_phases
    }

    /// Adapts `declared` and adds it at `priority`.
    ///
    /// The registration receives events accepted by both the listener's
    /// declared parameter type and `filter`. No uniqueness check is made:
    /// registering the same listener twice makes it fire twice.
    pub fn register(
        &self,
        declared: DeclaredListener,
        priority: Priority,
        filter: Option<EventFilter>,
    ) -> Result<RegistrationId, EventError> {
        if self.is_shutdown() {
            return Err(EventError::BusShutdown(self.name.clone()));
        }

        let listener = ListenerAdapter::adapt(declared)?;
        let filter = match filter {
            Some(extra) => both(listener.filter(), extra),
            None => listener.filter(),
        };

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            "📝 Registered {} on bus {} at priority {}",
            listener, self.name, priority.0
        );

        let registration = Arc::new(Registration {
            id,
            priority,
            filter,
            listener,
        });

        let mut registrations = self.registrations.write();
        let index = registrations.partition_point(|r| r.priority <= priority);
        registrations.insert(index, registration);
        Ok(id)
    }

    /// Registers a closure or function value listening for `E`.
    pub fn add_listener<E, F>(&self, priority: Priority, f: F) -> Result<RegistrationId, EventError>
    where
        E: Event,
        F: Fn(&mut E) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(
            DeclaredListener::function(type_name::<F>(), f),
            priority,
            None,
        )
    }

    /// Registers method `f` bound to `receiver`, listening for `E`.
    pub fn add_method<T, E, F>(
        &self,
        receiver: Arc<T>,
        name: &str,
        priority: Priority,
        f: F,
    ) -> Result<RegistrationId, EventError>
    where
        T: Any + Send + Sync,
        E: Event,
        F: Fn(&T, &mut E) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(DeclaredListener::method(receiver, name, f), priority, None)
    }

    /// Removes a registration. Returns false if it was not present.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        before != registrations.len()
    }

    /// Posts `event` to every accepting listener and hands it back.
    pub fn post<E: Event>(&self, mut event: E) -> E {
        self.post_dyn(&mut event);
        event
    }

    /// Posts a type-erased event in place.
    ///
    /// Every accepting listener is attempted in priority order. A failing or
    /// panicking listener is reported to the exception handler and dispatch
    /// continues with the next one.
    pub fn post_dyn(&self, event: &mut dyn Event) -> DispatchReport {
        if self.is_shutdown() {
            warn!("Bus {} is shut down; dropping {}", self.name, event.event_name());
            return DispatchReport::default();
        }

        let snapshot: Vec<Arc<Registration>> = self.registrations.read().clone();
        let mut report = DispatchReport::default();
        let mut aborts = 0;

        trace!("📤 Posting {} to {} listeners on {}", event.event_name(), snapshot.len(), self.name);

        for (index, registration) in snapshot.iter().enumerate() {
            if !registration.accepts(&*event) {
                continue;
            }

            report.invoked += 1;
            let outcome = self.invoke(registration, event);

            if let Err(error) = outcome {
                report.failed += 1;
                if let ListenerError::AbortStage { reason } = &error {
                    aborts += 1;
                    self.latch_abort(reason, registration, &*event);
                }
                self.report_failure(&*event, &snapshot, index, &error);
            }
        }

        let mut stats = self.stats.lock();
        stats.events_posted += 1;
        stats.listeners_invoked += report.invoked as u64;
        stats.listener_failures += report.failed as u64;
        stats.stage_aborts += aborts;

        report
    }

    fn invoke(&self, registration: &Registration, event: &mut dyn Event) -> ListenerResult {
        let _span = self
            .track_phases
            .then(|| trace_span!("listener", name = registration.listener().name()).entered());

        catch_unwind(AssertUnwindSafe(|| registration.listener().invoke(event)))
            .unwrap_or_else(|payload| Err(ListenerError::Panicked(panic_message(payload.as_ref()))))
    }

    fn latch_abort(&self, reason: &str, registration: &Registration, event: &dyn Event) {
        let mut slot = self.abort.lock();
        if slot.is_none() {
            *slot = Some(StageAbort {
                reason: reason.to_string(),
                listener: registration.listener().name().to_string(),
                event: event.event_name(),
            });
        }
    }

    fn report_failure(
        &self,
        event: &dyn Event,
        listeners: &[Arc<Registration>],
        index: usize,
        error: &ListenerError,
    ) {
        let handler = &self.exception_handler;
        let reported = catch_unwind(AssertUnwindSafe(|| {
            handler.on_failure(self, event, listeners, index, error)
        }));
        if reported.is_err() {
            error!("Exception handler on bus {} panicked while reporting: {}", self.name, error);
        }
    }

    /// Whether a listener has latched a stage abort since the last [`take_abort`](Self::take_abort).
    pub fn is_aborted(&self) -> bool {
        self.abort.lock().is_some()
    }

    /// Clears and returns the latched stage abort, if any.
    pub fn take_abort(&self) -> Option<StageAbort> {
        self.abort.lock().take()
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.read().len()
    }

    /// Current registrations in dispatch order.
    pub fn registrations(&self) -> Vec<Arc<Registration>> {
        self.registrations.read().clone()
    }

    pub fn stats(&self) -> BusStats {
        self.stats.lock().clone()
    }

    /// Stops the bus; later posts are dropped and registrations rejected.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        debug!("Bus {} shut down", self.name);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_event;

    #[derive(Debug, Default)]
    struct Trace {
        order: Vec<&'static str>,
    }
    impl_event!(Trace);

    #[derive(Debug, Default)]
    struct Unrelated;
    impl_event!(Unrelated);

    fn push(tag: &'static str) -> impl Fn(&mut Trace) -> ListenerResult + Send + Sync + 'static {
        move |e: &mut Trace| {
            e.order.push(tag);
            Ok(())
        }
    }

    #[test]
    fn test_priority_then_insertion_order() {
        let bus = EventBus::default();
        bus.add_listener(Priority(10), push("ten")).unwrap();
        bus.add_listener(Priority(5), push("five-a")).unwrap();
        bus.add_listener(Priority(5), push("five-b")).unwrap();
        bus.add_listener(Priority::HIGHEST, push("highest")).unwrap();

        let trace = bus.post(Trace::default());
        assert_eq!(trace.order, vec!["highest", "five-a", "five-b", "ten"]);
    }

    fn record_dup(e: &mut Trace) -> ListenerResult {
        e.order.push("dup");
        Ok(())
    }

    #[test]
    fn test_duplicate_registration_fires_twice() {
        let bus = EventBus::default();
        bus.add_listener(Priority::NORMAL, record_dup).unwrap();
        bus.add_listener(Priority::NORMAL, record_dup).unwrap();

        assert_eq!(bus.post(Trace::default()).order, vec!["dup", "dup"]);
    }

    #[test]
    fn test_filter_skips_unrelated_events() {
        let bus = EventBus::default();
        bus.add_listener(Priority::NORMAL, push("trace")).unwrap();

        let report = bus.post_dyn(&mut Unrelated);
        assert_eq!(report, DispatchReport { invoked: 0, failed: 0 });
    }

    #[test]
    fn test_extra_filter_is_combined() {
        let bus = EventBus::default();
        let only_empty: EventFilter = Arc::new(|e: &dyn Event| {
            e.as_any().downcast_ref::<Trace>().map_or(false, |t| t.order.is_empty())
        });
        bus.register(
            DeclaredListener::function("first", push("first")),
            Priority::NORMAL,
            Some(only_empty),
        )
        .unwrap();
        bus.add_listener(Priority::LOW, push("second")).unwrap();

        let trace = bus.post(Trace { order: vec!["seed"] });
        assert_eq!(trace.order, vec!["seed", "second"]);
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let bus = EventBus::default();
        bus.add_listener(Priority::HIGH, |_: &mut Trace| -> ListenerResult {
            panic!("listener exploded")
        })
        .unwrap();
        bus.add_listener(Priority::NORMAL, push("after")).unwrap();

        let mut trace = Trace::default();
        let report = bus.post_dyn(&mut trace);
        assert_eq!(report, DispatchReport { invoked: 2, failed: 1 });
        assert_eq!(trace.order, vec!["after"]);
        assert!(!bus.is_aborted());
    }

    #[test]
    fn test_abort_latches_first_reason() {
        let bus = EventBus::builder().name("abort").build();
        bus.add_listener(Priority::NORMAL, |_: &mut Trace| Err(ListenerError::abort("first")))
            .unwrap();
        bus.add_listener(Priority::LOW, |_: &mut Trace| Err(ListenerError::abort("second")))
            .unwrap();
        bus.add_listener(Priority::LOWEST, push("still-runs")).unwrap();

        let trace = bus.post(Trace::default());
        assert_eq!(trace.order, vec!["still-runs"]);

        let abort = bus.take_abort().unwrap();
        assert_eq!(abort.reason, "first");
        assert_eq!(abort.event, "Trace");
        assert!(bus.take_abort().is_none());
        assert_eq!(bus.stats().stage_aborts, 2);
    }

    #[test]
    fn test_unregister_removes_listener() {
        let bus = EventBus::default();
        let id = bus.add_listener(Priority::NORMAL, push("gone")).unwrap();
        bus.add_listener(Priority::NORMAL, push("kept")).unwrap();

        assert!(bus.unregister(id));
        assert!(!bus.unregister(id));
        assert_eq!(bus.post(Trace::default()).order, vec!["kept"]);
    }

    #[test]
    fn test_shutdown_rejects_registration_and_drops_posts() {
        let bus = EventBus::default();
        bus.add_listener(Priority::NORMAL, push("never")).unwrap();
        bus.shutdown();

        assert!(matches!(
            bus.add_listener(Priority::NORMAL, push("late")),
            Err(EventError::BusShutdown(_))
        ));
        assert!(bus.post(Trace::default()).order.is_empty());
    }

    #[test]
    fn test_reentrant_registration_applies_to_next_post() {
        let bus = Arc::new(EventBus::default());
        let inner = bus.clone();
        bus.add_listener(Priority::NORMAL, move |e: &mut Trace| {
            e.order.push("outer");
            inner
                .add_listener(Priority::LOW, push("inner"))
                .map_err(ListenerError::failed)?;
            Ok(())
        })
        .unwrap();

        assert_eq!(bus.post(Trace::default()).order, vec!["outer"]);
        assert_eq!(bus.post(Trace::default()).order, vec!["outer", "inner"]);
    }
}
