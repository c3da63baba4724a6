//! Automatic registration of declared event subscribers.

use crate::class_loader::{Instance, LoadedType, MemberBody, ModClassLoader, TypeKind};
use crate::context::ModLoadingContext;
use crate::error::ConfigurationError;
use crate::metadata::ModScanData;
use langbridge_eventbus::{DeclaredListener, EventBus};
use std::sync::Arc;
use tracing::debug;

/// Registers every subscriber a mod's scan data declares for the running side.
pub struct AutoListenerRegistrar;

impl AutoListenerRegistrar {
    /// Resolves and registers every applicable subscriber.
    ///
    /// Object types contribute their members as object functions on the object
    /// singleton; other types contribute static members only. The first failure
    /// stops registration and is returned. Returns the number of listeners
    /// registered.
    pub fn inject(
        context: &ModLoadingContext,
        scan_data: &ModScanData,
        class_loader: &dyn ModClassLoader,
    ) -> Result<usize, ConfigurationError> {
        debug!("Injecting automatic subscribers for {}", context.mod_id());

        let mut registered = 0;
        for annotation in &scan_data.subscribers {
            if !annotation.applies_to(context.mod_id(), context.dist()) {
                debug!(
                    "Skipping subscriber {} for {} on {}",
                    annotation.type_name,
                    context.mod_id(),
                    context.dist()
                );
                continue;
            }

            debug!(
                "Auto-subscribing {} to {:?} bus",
                annotation.type_name, annotation.bus
            );
            let loaded = class_loader.load_type(&annotation.type_name).map_err(|source| {
                ConfigurationError::SubscriberLoad {
                    type_name: annotation.type_name.clone(),
                    source,
                }
            })?;
            registered += Self::register_type(context, &loaded, context.bus_for(annotation.bus))?;
        }

        Ok(registered)
    }

    fn register_type(
        context: &ModLoadingContext,
        loaded: &LoadedType,
        bus: &Arc<EventBus>,
    ) -> Result<usize, ConfigurationError> {
        let receiver: Option<Instance> = match loaded.kind() {
            TypeKind::Object(cell) => Some(cell.get_or_init(context).map_err(|source| {
                ConfigurationError::ObjectInit {
                    type_name: loaded.name().to_string(),
                    source,
                }
            })?),
            TypeKind::Class(_) | TypeKind::Abstract => None,
        };

        for member in loaded.members() {
            let declared = match (&member.body, &receiver) {
                (MemberBody::Instance(body), Some(object)) => DeclaredListener::ObjectFunction {
                    object: object.clone(),
                    signature: member.signature.clone(),
                    body: body.clone(),
                },
                (MemberBody::Instance(_), None) => {
                    return Err(ConfigurationError::InstanceListenerOnClass {
                        type_name: loaded.name().to_string(),
                        member: member.name().to_string(),
                    })
                }
                (MemberBody::Static(body), _) => DeclaredListener::FreeFunction {
                    signature: member.signature.clone(),
                    body: body.clone(),
                },
            };

            bus.register(declared, member.priority, None)
                .map_err(|source| ConfigurationError::InvalidListener {
                    type_name: loaded.name().to_string(),
                    source,
                })?;
        }

        Ok(loaded.members().len())
    }
}
