//! # Langbridge Loader
//!
//! Stage-driven lifecycle coordination for mods built on the langbridge event
//! bus.
//!
//! The host creates one [`ModContainer`] per mod and feeds it
//! [`LifecycleNotification`]s in increasing [`Stage`] order. On
//! [`Stage::Construct`] the container resolves the mod type through the mod's
//! [`ModClassLoader`], instantiates it once and registers the automatic
//! subscribers listed in its [`ModScanData`]. Every later stage posts a
//! lifecycle event on the mod's private bus. Failures come back as
//! [`ModLoadingError`]s carrying the stage, a message key and the original
//! cause.
//!
//! ```rust
//! use langbridge_loader::{
//!     CommonSetupEvent, LifecycleEvent, LifecycleNotification, LoadedType, LoaderEnvironment, MemberDecl,
//!     ModContainer, ModInfo, ModLoadingContext, ModScanData, Stage, SubscriberAnnotation,
//!     TypeRegistry, Dist,
//! };
//! use langbridge_eventbus::Priority;
//! use std::sync::Arc;
//!
//! struct ExampleMod;
//! struct Events;
//!
//! let registry = TypeRegistry::new("example")
//!     .with_type(LoadedType::class("example::ExampleMod", |_: &ModLoadingContext| Ok(ExampleMod)))
//!     .with_type(LoadedType::object("example::Events", |_: &ModLoadingContext| Ok(Events)).with_member(
//!         MemberDecl::instance("Events::setup", Priority::NORMAL, |_: &Events, e: &mut CommonSetupEvent| {
//!             assert_eq!(e.mod_id(), "example");
//!             Ok(())
//!         }),
//!     ));
//! let scan = ModScanData::default().with_subscriber(SubscriberAnnotation::new("example::Events"));
//!
//! let mut container = ModContainer::new(
//!     ModInfo::new("example"),
//!     "example::ExampleMod",
//!     Arc::new(registry),
//!     scan,
//!     &LoaderEnvironment::new(Dist::Client),
//! );
//! container.dispatch(LifecycleNotification::new(Stage::Construct)).unwrap();
//! container.dispatch(LifecycleNotification::new(Stage::CommonSetup)).unwrap();
//! assert_eq!(container.current_stage(), Some(Stage::CommonSetup));
//! ```

pub mod class_loader;
pub mod config_event;
pub mod container;
pub mod context;
pub mod error;
pub mod events;
pub mod metadata;
pub mod stage;
pub mod subscriber;

pub use class_loader::{
    Initializer, Instance, LoadedType, MemberBody, MemberDecl, ModClassLoader, ObjectCell,
    TypeKind, TypeLoadError, TypeRegistry,
};
pub use config_event::{ConfigEventKind, ConfigType, ModConfig, ModConfigEvent};
pub use container::{LoaderEnvironment, ModContainer};
pub use context::ModLoadingContext;
pub use error::{keys, ConfigurationError, ModLoadingError};
pub use events::{
    as_lifecycle, build_stage_event, on_any_lifecycle, CommonSetupEvent, ConstructModEvent,
    EnqueueImcEvent, GatherDataEvent, LifecycleContext, LifecycleEvent, LoadCompleteEvent,
    LoadRegistriesEvent, ModLifecycleEvent, NewRegistryEvent, ProcessImcEvent, SidedSetupEvent,
};
pub use metadata::{BusTarget, ModInfo, ModScanData, SubscriberAnnotation};
pub use stage::{Dist, LifecycleNotification, Stage};
pub use subscriber::AutoListenerRegistrar;
