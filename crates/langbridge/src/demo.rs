//! Bundled demo mod code.
//!
//! Stands in for mod code the host would normally resolve from a mod's own
//! files. The default configuration loads `demo::ExampleMod` with its two
//! subscriber types.

use langbridge_eventbus::Priority;
use langbridge_loader::{
    on_any_lifecycle, CommonSetupEvent, ConfigEventKind, EnqueueImcEvent, LifecycleContext,
    LifecycleEvent, LoadCompleteEvent, LoadedType, MemberDecl, ModConfigEvent,
    ModLoadingContext, SidedSetupEvent, TypeRegistry,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// The demo mod's main type.
pub struct ExampleMod {
    config_loads: Arc<AtomicU32>,
}

impl ExampleMod {
    fn new(context: &ModLoadingContext) -> anyhow::Result<Self> {
        let bus = context.mod_bus();
        bus.register(
            on_any_lifecycle("ExampleMod::trace_stage", |ctx: &LifecycleContext| {
                debug!("🔎 {} reached {}", ctx.mod_id, ctx.stage);
                Ok(())
            }),
            Priority::LOWEST,
            None,
        )?;
        bus.add_listener(Priority::NORMAL, |event: &mut LoadCompleteEvent| {
            info!("✅ {} finished loading", event.mod_id());
            Ok(())
        })?;

        let config_loads = Arc::new(AtomicU32::new(0));
        let counter = config_loads.clone();
        bus.add_listener(Priority::NORMAL, move |event: &mut ModConfigEvent| {
            if event.kind == ConfigEventKind::Loading {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            info!("⚙️ {} config {} is {:?}", event.mod_id, event.config.file_name, event.kind);
            Ok(())
        })?;

        Ok(Self { config_loads })
    }

    pub fn config_loads(&self) -> u32 {
        self.config_loads.load(Ordering::SeqCst)
    }
}

/// Singleton subscriber recording the setup stages it saw.
#[derive(Default)]
pub struct SetupHooks {
    seen: Mutex<Vec<String>>,
}

impl SetupHooks {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

/// Registers the demo types.
pub fn register(registry: &mut TypeRegistry) {
    registry.register(LoadedType::class("demo::ExampleMod", ExampleMod::new));

    registry.register(
        LoadedType::object("demo::SetupHooks", |_: &ModLoadingContext| Ok(SetupHooks::default()))
            .with_member(MemberDecl::instance(
                "SetupHooks::on_common_setup",
                Priority::NORMAL,
                |hooks: &SetupHooks, event: &mut CommonSetupEvent| {
                    hooks.seen.lock().push(format!("{}:{}", event.mod_id(), event.stage()));
                    Ok(())
                },
            ))
            .with_member(MemberDecl::instance(
                "SetupHooks::on_enqueue_imc",
                Priority::HIGH,
                |hooks: &SetupHooks, event: &mut EnqueueImcEvent| {
                    hooks.seen.lock().push(format!("{}:{}", event.mod_id(), event.stage()));
                    Ok(())
                },
            )),
    );

    registry.register(
        LoadedType::abstract_type("demo::ClientHooks").with_member(MemberDecl::static_fn(
            "ClientHooks::on_sided_setup",
            Priority::NORMAL,
            |event: &mut SidedSetupEvent| {
                info!("🖥️ Client setup for {} on {}", event.mod_id(), event.dist());
                Ok(())
            },
        )),
    );
}

/// Registry holding every demo type.
pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new("demo");
    register(&mut registry);
    registry
}
