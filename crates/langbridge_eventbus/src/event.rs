//! Core event trait and event filters.
//!
//! Events are mutable envelopes handed to each listener in turn. The bus never
//! clones an event during a post, so every listener observes the mutations made
//! by the listeners that ran before it.

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

/// Trait that all events must implement.
///
/// Most implementations come from [`impl_event!`](crate::impl_event), which also
/// wires up family markers for [`Event::is_a`].
pub trait Event: Any + Send + Sync + Debug {
    /// Human readable event name used in logs and failure reports.
    fn event_name(&self) -> &'static str;

    /// Upcast for downcasting to the concrete event type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete event type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns true if this event is an instance of `kind`.
    ///
    /// `kind` is either the concrete event type or one of the family markers the
    /// event declares. Listeners taking a family marker receive every event of
    /// that family.
    fn is_a(&self, kind: TypeId) -> bool {
        self.as_any().type_id() == kind || kind == TypeId::of::<AnyEvent>()
    }
}

/// Predicate deciding whether a registration receives an event.
pub type EventFilter = Arc<dyn Fn(&dyn Event) -> bool + Send + Sync>;

/// Filter that accepts every event.
pub fn accept_all() -> EventFilter {
    Arc::new(|_: &dyn Event| true)
}

/// Filter that accepts events that are an instance of `T`.
///
/// `T` may be a concrete event type or a family marker.
pub fn instance_of<T: Any>() -> EventFilter {
    let kind = TypeId::of::<T>();
    Arc::new(move |event: &dyn Event| event.is_a(kind))
}

/// Combines two filters; both must accept.
pub fn both(a: EventFilter, b: EventFilter) -> EventFilter {
    Arc::new(move |event: &dyn Event| a(event) && b(event))
}

/// Family marker every event belongs to; a listener declared on it receives any event.
#[derive(Debug, Clone, Copy)]
pub struct AnyEvent;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_event;

    #[derive(Debug)]
    struct Family;

    #[derive(Debug, Default)]
    struct Ping {
        hops: u32,
    }
    impl_event!(Ping);

    #[derive(Debug, Default)]
    struct Pong;
    impl_event!(Pong: Family);

    #[test]
    fn test_instance_of_matches_concrete_type() {
        let filter = instance_of::<Ping>();
        assert!(filter(&Ping::default()));
        assert!(!filter(&Pong));
    }

    #[test]
    fn test_family_membership() {
        let family = instance_of::<Family>();
        assert!(family(&Pong));
        assert!(!family(&Ping { hops: 3 }));
    }

    #[test]
    fn test_any_event_accepts_everything() {
        let filter = instance_of::<AnyEvent>();
        assert!(filter(&Ping::default()));
        assert!(filter(&Pong));
    }

    #[test]
    fn test_both_requires_each_filter() {
        let filter = both(instance_of::<Ping>(), Arc::new(|e: &dyn Event| {
            e.as_any().downcast_ref::<Ping>().map_or(false, |p| p.hops > 1)
        }));
        assert!(!filter(&Ping { hops: 1 }));
        assert!(filter(&Ping { hops: 2 }));
    }
}
