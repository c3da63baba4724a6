//! Lifecycle events posted to a mod's bus, one type per stage.
//!
//! Every lifecycle event belongs to the [`ModLifecycleEvent`] family, so a
//! listener declared on the family marker receives all of them. Use
//! [`as_lifecycle`] to read the shared [`LifecycleContext`] from such a listener.

use crate::stage::{Dist, Stage};
use langbridge_eventbus::{
    impl_event, DeclaredListener, Event, ListenerResult, ListenerSignature,
};
use std::sync::Arc;

/// Diagnostic context shared by all lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleContext {
    pub mod_id: String,
    pub stage: Stage,
}

/// Family marker for every lifecycle event.
#[derive(Debug, Clone, Copy)]
pub struct ModLifecycleEvent;

/// Common view of the per-stage event types.
pub trait LifecycleEvent: Event {
    fn context(&self) -> &LifecycleContext;

    fn stage(&self) -> Stage {
        self.context().stage
    }

    fn mod_id(&self) -> &str {
        &self.context().mod_id
    }
}

macro_rules! lifecycle_event {
    ($(#[$meta:meta])* $name:ident => $stage:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            context: LifecycleContext,
        }

        impl $name {
            pub fn new(mod_id: impl Into<String>) -> Self {
                Self {
                    context: LifecycleContext {
                        mod_id: mod_id.into(),
                        stage: $stage,
                    },
                }
            }
        }

        impl LifecycleEvent for $name {
            fn context(&self) -> &LifecycleContext {
                &self.context
            }
        }

        impl_event!($name: ModLifecycleEvent);
    };
}

lifecycle_event!(
    /// Posted once the mod instance exists and its subscribers are registered.
    ConstructModEvent => Stage::Construct
);
lifecycle_event!(NewRegistryEvent => Stage::CreateRegistries);
lifecycle_event!(LoadRegistriesEvent => Stage::LoadRegistries);
lifecycle_event!(
    /// Setup shared by both sides.
    CommonSetupEvent => Stage::CommonSetup
);
lifecycle_event!(
    /// Inter-mod communication: mods enqueue messages for each other.
    EnqueueImcEvent => Stage::EnqueueImc
);
lifecycle_event!(
    /// Inter-mod communication: mods drain the messages sent to them.
    ProcessImcEvent => Stage::ProcessImc
);
lifecycle_event!(LoadCompleteEvent => Stage::Complete);
lifecycle_event!(GatherDataEvent => Stage::GatherData);

/// Setup specific to the running side.
#[derive(Debug, Clone)]
pub struct SidedSetupEvent {
    context: LifecycleContext,
    dist: Dist,
}

impl SidedSetupEvent {
    pub fn new(mod_id: impl Into<String>, dist: Dist) -> Self {
        Self {
            context: LifecycleContext {
                mod_id: mod_id.into(),
                stage: Stage::SidedSetup,
            },
            dist,
        }
    }

    pub fn dist(&self) -> Dist {
        self.dist
    }
}

impl LifecycleEvent for SidedSetupEvent {
    fn context(&self) -> &LifecycleContext {
        &self.context
    }
}

impl_event!(SidedSetupEvent: ModLifecycleEvent);

/// Builds the event posted for `stage` when the notification carries none.
///
/// Returns `None` for [`Stage::Error`], which has no event.
pub fn build_stage_event(stage: Stage, mod_id: &str, dist: Dist) -> Option<Box<dyn Event>> {
    let event: Box<dyn Event> = match stage {
        Stage::Construct => Box::new(ConstructModEvent::new(mod_id)),
        Stage::CreateRegistries => Box::new(NewRegistryEvent::new(mod_id)),
        Stage::LoadRegistries => Box::new(LoadRegistriesEvent::new(mod_id)),
        Stage::CommonSetup => Box::new(CommonSetupEvent::new(mod_id)),
        Stage::SidedSetup => Box::new(SidedSetupEvent::new(mod_id, dist)),
        Stage::EnqueueImc => Box::new(EnqueueImcEvent::new(mod_id)),
        Stage::ProcessImc => Box::new(ProcessImcEvent::new(mod_id)),
        Stage::Complete => Box::new(LoadCompleteEvent::new(mod_id)),
        Stage::GatherData => Box::new(GatherDataEvent::new(mod_id)),
        Stage::Error => return None,
    };
    Some(event)
}

/// Views `event` as a lifecycle event if it is one.
pub fn as_lifecycle(event: &dyn Event) -> Option<&dyn LifecycleEvent> {
    let any = event.as_any();
    if let Some(e) = any.downcast_ref::<ConstructModEvent>() {
        return Some(e);
    }
    if let Some(e) = any.downcast_ref::<NewRegistryEvent>() {
        return Some(e);
    }
    if let Some(e) = any.downcast_ref::<LoadRegistriesEvent>() {
        return Some(e);
    }
    if let Some(e) = any.downcast_ref::<CommonSetupEvent>() {
        return Some(e);
    }
    if let Some(e) = any.downcast_ref::<SidedSetupEvent>() {
        return Some(e);
    }
    if let Some(e) = any.downcast_ref::<EnqueueImcEvent>() {
        return Some(e);
    }
    if let Some(e) = any.downcast_ref::<ProcessImcEvent>() {
        return Some(e);
    }
    if let Some(e) = any.downcast_ref::<LoadCompleteEvent>() {
        return Some(e);
    }
    if let Some(e) = any.downcast_ref::<GatherDataEvent>() {
        return Some(e);
    }
    None
}

/// Free-function listener receiving every lifecycle event of a mod.
pub fn on_any_lifecycle<F>(name: impl Into<String>, f: F) -> DeclaredListener
where
    F: Fn(&LifecycleContext) -> ListenerResult + Send + Sync + 'static,
{
    DeclaredListener::FreeFunction {
        signature: ListenerSignature::free::<ModLifecycleEvent>(name),
        body: Arc::new(move |event: &mut dyn Event| match as_lifecycle(&*event) {
            Some(lifecycle) => f(lifecycle.context()),
            None => Ok(()),
        }),
    }
}
