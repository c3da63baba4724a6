//! Per-mod lifecycle coordinator.
//!
//! A [`ModContainer`] owns one mod's runtime state: its private event bus, the
//! mod instance once constructed, and the current [`Stage`]. The host feeds it
//! [`LifecycleNotification`]s through [`ModContainer::dispatch`].
//!
//! ## Stage handling
//!
//! - **Construct**: resolve the mod type, instantiate it exactly once, register
//!   automatic subscribers, then post [`ConstructModEvent`](crate::ConstructModEvent).
//!   The instance is kept only once all of this succeeded.
//! - **Every other stage**: post the stage event on the mod bus, then check
//!   whether a listener aborted the stage.
//!
//! Any failure moves the mod to [`Stage::Error`] and is returned to the host as
//! a [`ModLoadingError`]. Nothing runs for a mod in `Error`.
//!
//! ## Threading
//!
//! Containers for different mods share nothing and may be driven from
//! different threads. One container must be driven by one caller at a time;
//! `dispatch` takes `&mut self` for that reason.

use crate::class_loader::{guarded, panic_message, Instance, LoadedType, ModClassLoader, TypeKind};
use crate::config_event::ModConfigEvent;
use crate::context::ModLoadingContext;
use crate::error::{keys, ConfigurationError, ModLoadingError};
use crate::events::build_stage_event;
use crate::metadata::{ModInfo, ModScanData};
use crate::stage::{Dist, LifecycleNotification, Stage};
use crate::subscriber::AutoListenerRegistrar;
use langbridge_eventbus::{Event, EventBus, ExceptionHandler, LoggingExceptionHandler};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared loader settings every container is created with.
#[derive(Clone)]
pub struct LoaderEnvironment {
    pub dist: Dist,
    pub host_bus: Arc<EventBus>,
    pub track_phases: bool,
    pub exception_handler: Arc<dyn ExceptionHandler>,
}

impl LoaderEnvironment {
    pub fn new(dist: Dist) -> Self {
        Self {
            dist,
            host_bus: Arc::new(EventBus::builder().name("host").build()),
            track_phases: false,
            exception_handler: Arc::new(LoggingExceptionHandler),
        }
    }

    pub fn with_host_bus(mut self, host_bus: Arc<EventBus>) -> Self {
        self.host_bus = host_bus;
        self
    }

    pub fn with_track_phases(mut self, track_phases: bool) -> Self {
        self.track_phases = track_phases;
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = handler;
        self
    }
}

/// Mutable state of one mod, owned by its container.
struct ModRuntimeState {
    mod_instance: Option<Instance>,
    current_stage: Option<Stage>,
}

/// Drives one mod through the loading stages.
pub struct ModContainer {
    info: ModInfo,
    type_name: String,
    class_loader: Arc<dyn ModClassLoader>,
    scan_data: ModScanData,
    event_bus: Arc<EventBus>,
    context: ModLoadingContext,
    state: ModRuntimeState,
}

impl ModContainer {
    /// Creates the container and the mod's private bus. Nothing is loaded yet.
    pub fn new(
        info: ModInfo,
        type_name: impl Into<String>,
        class_loader: Arc<dyn ModClassLoader>,
        scan_data: ModScanData,
        environment: &LoaderEnvironment,
    ) -> Self {
        let type_name = type_name.into();
        debug!(
            "Creating ModContainer for {} ({}) with {}",
            info.mod_id,
            type_name,
            class_loader.describe()
        );

        let event_bus = Arc::new(
            EventBus::builder()
                .name(info.mod_id.clone())
                .exception_handler(environment.exception_handler.clone())
                .track_phases(environment.track_phases)
                .build(),
        );
        let context = ModLoadingContext::new(
            info.clone(),
            event_bus.clone(),
            environment.host_bus.clone(),
            environment.dist,
        );

        Self {
            info,
            type_name,
            class_loader,
            scan_data,
            event_bus,
            context,
            state: ModRuntimeState {
                mod_instance: None,
                current_stage: None,
            },
        }
    }

    pub fn mod_id(&self) -> &str {
        &self.info.mod_id
    }

    pub fn mod_info(&self) -> &ModInfo {
        &self.info
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Last stage dispatched, or `None` before Construct.
    pub fn current_stage(&self) -> Option<Stage> {
        self.state.current_stage
    }

    pub fn is_errored(&self) -> bool {
        self.state.current_stage == Some(Stage::Error)
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn context(&self) -> &ModLoadingContext {
        &self.context
    }

    pub fn mod_instance(&self) -> Option<&Instance> {
        self.state.mod_instance.as_ref()
    }

    /// The mod instance as its concrete type.
    pub fn mod_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.state.mod_instance.clone()?.downcast::<T>().ok()
    }

    /// Whether `candidate` is this mod's instance. False before Construct.
    ///
    /// Both the address and the concrete type must match, so a reference to a
    /// field at offset zero of the instance is not the instance.
    pub fn matches(&self, candidate: &(dyn Any + Send + Sync)) -> bool {
        self.state.mod_instance.as_ref().map_or(false, |instance| {
            Any::type_id(&**instance) == Any::type_id(candidate)
                && std::ptr::eq(
                    Arc::as_ptr(instance) as *const (),
                    candidate as *const (dyn Any + Send + Sync) as *const (),
                )
        })
    }

    /// Handles one stage notification.
    ///
    /// Stages must arrive in strictly increasing order starting with Construct.
    /// A notification that breaks this order is rejected with
    /// [`keys::STAGE_OUT_OF_ORDER`] and leaves the mod untouched. A panic that
    /// escapes the stage handler fails the stage like any other error.
    pub fn dispatch(&mut self, notification: LifecycleNotification) -> Result<(), ModLoadingError> {
        let LifecycleNotification { stage, event } = notification;
        self.check_order(stage)?;

        let result = catch_unwind(AssertUnwindSafe(|| match stage {
            Stage::Construct => self.construct_mod(event),
            _ => self.fire_event(stage, event),
        }))
        .unwrap_or_else(|payload| {
            Err(ModLoadingError::new(
                &self.info,
                stage,
                failure_key(stage),
                anyhow::anyhow!("{} handler panicked: {}", stage, panic_message(&*payload)),
            ))
        });

        match result {
            Ok(()) => {
                self.state.current_stage = Some(stage);
                Ok(())
            }
            Err(err) => Err(self.record_failure(err)),
        }
    }

    /// Moves the mod to [`Stage::Error`] for a stage its caller could not finish.
    pub fn fail_stage(&mut self, stage: Stage, cause: anyhow::Error) -> ModLoadingError {
        let err = ModLoadingError::new(&self.info, stage, failure_key(stage), cause);
        self.record_failure(err)
    }

    fn record_failure(&mut self, err: ModLoadingError) -> ModLoadingError {
        error!(
            "Mod {} failed during {} with {}: {:#}",
            self.mod_id(),
            err.stage,
            err.message_key,
            err.cause
        );
        self.state.current_stage = Some(Stage::Error);
        err
    }

    fn check_order(&self, stage: Stage) -> Result<(), ModLoadingError> {
        let reason = match self.state.current_stage {
            Some(Stage::Error) => Some(format!("mod is in error state, refusing {}", stage)),
            _ if stage == Stage::Error => Some("the error stage is never dispatched".to_string()),
            None if stage != Stage::Construct => {
                Some(format!("first stage must be construct, got {}", stage))
            }
            Some(current) if stage <= current => Some(match current.next() {
                Some(next) => format!("stage {} does not follow {}, expected {} or later", stage, current, next),
                None => format!("stage {} does not follow {}, no stages remain", stage, current),
            }),
            _ => None,
        };

        match reason {
            Some(reason) => {
                warn!("Rejecting stage {} for {}: {}", stage, self.mod_id(), reason);
                Err(ModLoadingError::new(
                    &self.info,
                    stage,
                    keys::STAGE_OUT_OF_ORDER,
                    anyhow::anyhow!(reason),
                ))
            }
            None => Ok(()),
        }
    }

    fn construct_mod(&mut self, event: Option<Box<dyn Event>>) -> Result<(), ModLoadingError> {
        let loaded = self.class_loader.load_type(&self.type_name).map_err(|source| {
            error!("Failed to load mod type {} for {}", self.type_name, self.mod_id());
            self.config_failure(
                keys::FAILED_TO_LOAD_MOD_CLASS,
                ConfigurationError::TypeResolution {
                    type_name: self.type_name.clone(),
                    source,
                },
            )
        })?;
        debug!("Loaded mod type {} for {}", loaded.name(), self.mod_id());

        let instance = self
            .instantiate(&loaded)
            .map_err(|err| self.config_failure(keys::FAILED_TO_LOAD_MOD, err))?;
        debug!("Instantiated mod {}", self.mod_id());

        let registered = AutoListenerRegistrar::inject(
            &self.context,
            &self.scan_data,
            self.class_loader.as_ref(),
        )
        .map_err(|err| self.config_failure(keys::FAILED_TO_LOAD_MOD, err))?;
        debug!("Registered {} automatic listeners for {}", registered, self.mod_id());

        self.fire_event(Stage::Construct, event)?;

        self.state.mod_instance = Some(instance);
        info!("🔧 Constructed mod {} ({})", self.info.display_name, self.info.version);
        Ok(())
    }

    fn instantiate(&self, loaded: &LoadedType) -> Result<Instance, ConfigurationError> {
        let type_name = loaded.name().to_string();
        let outcome = match loaded.kind() {
            TypeKind::Object(cell) => cell.get_or_init(&self.context),
            TypeKind::Class(ctor) => guarded("constructor", || ctor(&self.context)),
            TypeKind::Abstract => {
                return Err(ConfigurationError::NotInstantiable {
                    type_name,
                    reason: "abstract types have no zero-argument constructor".to_string(),
                })
            }
        };
        outcome.map_err(|source| ConfigurationError::Instantiation { type_name, source })
    }

    fn fire_event(&self, stage: Stage, event: Option<Box<dyn Event>>) -> Result<(), ModLoadingError> {
        let mut event = match event {
            Some(event) => event,
            None => build_stage_event(stage, self.mod_id(), self.context.dist()).ok_or_else(|| {
                ModLoadingError::new(
                    &self.info,
                    stage,
                    keys::ERROR_DURING_EVENT,
                    anyhow::anyhow!("no event exists for stage {}", stage),
                )
            })?,
        };

        if let Some(stale) = self.event_bus.take_abort() {
            warn!("Discarding stale abort on {}: {}", self.mod_id(), stale.reason);
        }

        debug!("Firing event for modid {} : {}", self.mod_id(), event.event_name());
        let report = self.event_bus.post_dyn(&mut *event);
        debug!(
            "Fired event for modid {} : {} ({} invoked, {} failed)",
            self.mod_id(),
            event.event_name(),
            report.invoked,
            report.failed
        );

        match self.event_bus.take_abort() {
            Some(abort) => {
                error!(
                    "An error occurred while dispatching event {} to {}",
                    stage,
                    self.mod_id()
                );
                Err(ModLoadingError::new(
                    &self.info,
                    stage,
                    keys::ERROR_DURING_EVENT,
                    anyhow::anyhow!(
                        "{} aborted {} by {}: {}",
                        abort.listener,
                        abort.event,
                        self.mod_id(),
                        abort.reason
                    ),
                ))
            }
            None => Ok(()),
        }
    }

    /// Posts a configuration event to the mod bus outside the stage sequence.
    pub fn dispatch_config_event(&self, event: ModConfigEvent) -> ModConfigEvent {
        debug!(
            "Dispatching {:?} config event for {} ({})",
            event.kind,
            self.mod_id(),
            event.config.file_name
        );
        self.accept_event(event)
    }

    /// Posts an externally sourced event to the mod bus and hands it back.
    ///
    /// An abort raised by a listener here cannot fail a stage; it is logged and
    /// cleared.
    pub fn accept_event<E: Event>(&self, event: E) -> E {
        let event = self.event_bus.post(event);
        if let Some(abort) = self.event_bus.take_abort() {
            warn!(
                "Ignoring abort from {} on out-of-band {} for {}: {}",
                abort.listener,
                abort.event,
                self.mod_id(),
                abort.reason
            );
        }
        event
    }

    fn config_failure(&self, key: &'static str, err: ConfigurationError) -> ModLoadingError {
        let offending = err.type_name().to_string();
        ModLoadingError::new(&self.info, Stage::Construct, key, err).with_offending_type(offending)
    }
}

impl std::fmt::Debug for ModContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModContainer")
            .field("mod_id", &self.info.mod_id)
            .field("type_name", &self.type_name)
            .field("current_stage", &self.state.current_stage)
            .field("constructed", &self.state.mod_instance.is_some())
            .finish()
    }
}

fn failure_key(stage: Stage) -> &'static str {
    match stage {
        Stage::Construct => keys::FAILED_TO_LOAD_MOD,
        _ => keys::ERROR_DURING_EVENT,
    }
}
