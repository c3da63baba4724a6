//! Stage driver: feeds every configured mod through the loading stages.
//!
//! Stages run strictly in order. A stage is delivered to every live mod before
//! the next one starts; with parallel dispatch the mods of one stage run
//! concurrently on the blocking pool. A mod whose container raised a stage
//! failure is dropped from every later stage, the rest keep loading.

use crate::config::ModEntry;
use dashmap::DashMap;
use langbridge_loader::{
    LifecycleNotification, LoaderEnvironment, ModConfig, ModConfigEvent, ModClassLoader,
    ModContainer, ModLoadingError, Stage,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of running every stage.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Mods that completed every stage, in load order
    pub loaded: Vec<String>,
    /// Every stage failure, in the order they were raised
    pub failures: Vec<ModLoadingError>,
}

impl LoadSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns the containers of every configured mod.
pub struct ModHost {
    environment: LoaderEnvironment,
    parallel_dispatch: bool,
    containers: DashMap<String, Arc<Mutex<ModContainer>>>,
    load_order: Vec<String>,
    configs: HashMap<String, ModConfig>,
}

impl ModHost {
    pub fn new(environment: LoaderEnvironment, parallel_dispatch: bool) -> Self {
        Self {
            environment,
            parallel_dispatch,
            containers: DashMap::new(),
            load_order: Vec::new(),
            configs: HashMap::new(),
        }
    }

    pub fn environment(&self) -> &LoaderEnvironment {
        &self.environment
    }

    /// Creates the container for `entry`. Nothing is loaded until [`run_stages`](Self::run_stages).
    pub fn add_mod(&mut self, entry: &ModEntry, class_loader: Arc<dyn ModClassLoader>) -> anyhow::Result<()> {
        if self.containers.contains_key(&entry.mod_id) {
            anyhow::bail!("Mod {} is already registered", entry.mod_id);
        }

        let container = ModContainer::new(
            entry.mod_info(),
            entry.entry_type.clone(),
            class_loader,
            entry.scan_data(),
            &self.environment,
        );
        self.containers
            .insert(entry.mod_id.clone(), Arc::new(Mutex::new(container)));
        self.load_order.push(entry.mod_id.clone());
        if let Some(config) = entry.common_config() {
            self.configs.insert(entry.mod_id.clone(), config);
        }

        debug!("📦 Added mod {} ({})", entry.mod_id, entry.entry_type);
        Ok(())
    }

    pub fn mod_count(&self) -> usize {
        self.load_order.len()
    }

    pub fn container(&self, mod_id: &str) -> Option<Arc<Mutex<ModContainer>>> {
        self.containers.get(mod_id).map(|entry| entry.value().clone())
    }

    /// Mods that have not failed, in load order.
    pub fn live_mods(&self) -> Vec<String> {
        self.load_order
            .iter()
            .filter(|id| {
                self.containers
                    .get(id.as_str())
                    .map_or(false, |container| !container.lock().is_errored())
            })
            .cloned()
            .collect()
    }

    /// Runs every stage in order over all live mods.
    pub async fn run_stages(&self) -> LoadSummary {
        let mut summary = LoadSummary::default();

        for stage in Stage::ALL_DISPATCH {
            let live = self.live_mods();
            if live.is_empty() {
                warn!("No live mods left, stopping before {}", stage);
                break;
            }

            info!("🚦 Dispatching {} to {} mods", stage, live.len());
            let failures = if self.parallel_dispatch {
                self.dispatch_parallel(stage, live).await
            } else {
                self.dispatch_sequential(stage, &live)
            };

            for failure in failures {
                error!(
                    "❌ Mod {} failed during {} ({})",
                    failure.mod_id(),
                    failure.stage,
                    failure.message_key
                );
                summary.failures.push(failure);
            }
        }

        summary.loaded = self.live_mods();
        info!(
            "📊 Loading finished: {} loaded, {} failed",
            summary.loaded.len(),
            summary.failures.len()
        );
        summary
    }

    fn dispatch_sequential(&self, stage: Stage, mods: &[String]) -> Vec<ModLoadingError> {
        mods.iter()
            .filter_map(|mod_id| self.container(mod_id))
            .filter_map(|container| {
                container
                    .lock()
                    .dispatch(LifecycleNotification::new(stage))
                    .err()
            })
            .collect()
    }

    async fn dispatch_parallel(&self, stage: Stage, mods: Vec<String>) -> Vec<ModLoadingError> {
        let containers: Vec<_> = mods.iter().filter_map(|mod_id| self.container(mod_id)).collect();
        let tasks = containers.iter().cloned().map(|container| {
            tokio::task::spawn_blocking(move || {
                container.lock().dispatch(LifecycleNotification::new(stage))
            })
        });

        futures::future::join_all(tasks)
            .await
            .into_iter()
            .zip(&containers)
            .filter_map(|(joined, container)| match joined {
                Ok(result) => result.err(),
                Err(e) => {
                    error!("Stage {} task did not complete: {}", stage, e);
                    Some(
                        container
                            .lock()
                            .fail_stage(stage, anyhow::anyhow!("stage task did not complete: {}", e)),
                    )
                }
            })
            .collect()
    }

    /// Posts each live mod's common config as a loading event.
    ///
    /// Returns the number of mods that received a config.
    pub fn load_configs(&self) -> usize {
        self.post_configs(|mod_id, config| ModConfigEvent::loading(mod_id, config))
    }

    /// Replaces stored configs that differ from `entries` and posts a reloading
    /// event for each one.
    ///
    /// Returns the number of mods whose config changed.
    pub fn reload_configs(&mut self, entries: &[ModEntry]) -> usize {
        let mut changed = Vec::new();
        for entry in entries {
            let Some(config) = entry.common_config() else {
                continue;
            };
            if !self.containers.contains_key(&entry.mod_id)
                || self.configs.get(&entry.mod_id) == Some(&config)
            {
                continue;
            }
            self.configs.insert(entry.mod_id.clone(), config);
            changed.push(entry.mod_id.clone());
        }

        for mod_id in &changed {
            let (Some(config), Some(container)) = (self.configs.get(mod_id), self.container(mod_id)) else {
                continue;
            };
            let container = container.lock();
            if container.is_errored() || container.mod_instance().is_none() {
                continue;
            }
            container.dispatch_config_event(ModConfigEvent::reloading(mod_id.clone(), config.clone()));
        }

        debug!("Reloaded {} mod configs", changed.len());
        changed.len()
    }

    /// Posts unloading config events and shuts down every mod bus.
    pub fn shutdown(&self) {
        let unloaded = self.post_configs(|mod_id, config| ModConfigEvent::unloading(mod_id, config));
        debug!("Unloaded {} mod configs", unloaded);

        for entry in self.containers.iter() {
            entry.value().lock().event_bus().shutdown();
        }
        self.environment.host_bus.shutdown();
        info!("🛑 Mod host shut down");
    }

    fn post_configs(&self, build: fn(String, ModConfig) -> ModConfigEvent) -> usize {
        let mut posted = 0;
        for mod_id in self.live_mods() {
            let (Some(config), Some(container)) = (self.configs.get(&mod_id), self.container(&mod_id)) else {
                continue;
            };
            let container = container.lock();
            if container.mod_instance().is_none() {
                continue;
            }
            container.dispatch_config_event(build(mod_id, config.clone()));
            posted += 1;
        }
        posted
    }

    /// Finds the mod whose instance is `candidate`.
    pub fn owner_of(&self, candidate: &(dyn Any + Send + Sync)) -> Option<String> {
        self.containers
            .iter()
            .find(|entry| entry.value().lock().matches(candidate))
            .map(|entry| entry.key().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::demo::{self, ExampleMod, SetupHooks};
    use langbridge_eventbus::{ListenerError, Priority};
    use langbridge_loader::{
        keys, CommonSetupEvent, ConfigEventKind, Dist, LoadedType, ModLoadingContext,
        SubscriberAnnotation, TypeKind, TypeRegistry,
    };

    fn entry(mod_id: &str, entry_type: &str) -> ModEntry {
        ModEntry {
            mod_id: mod_id.to_string(),
            display_name: None,
            version: "1.0.0".to_string(),
            entry_type: entry_type.to_string(),
            subscribers: Vec::new(),
            config: None,
        }
    }

    fn registry_with_failing_setup() -> TypeRegistry {
        let mut registry = demo::registry();
        registry.register(LoadedType::class("test::Failing", |ctx: &ModLoadingContext| {
            ctx.mod_bus()
                .add_listener(Priority::NORMAL, |_: &mut CommonSetupEvent| {
                    Err(ListenerError::abort("setup rejected"))
                })?;
            Ok(())
        }));
        registry
    }

    fn setup_hooks(registry: &TypeRegistry) -> Arc<SetupHooks> {
        let loaded = registry.load_type("demo::SetupHooks").unwrap();
        match loaded.kind() {
            TypeKind::Object(cell) => cell.get().unwrap().clone().downcast::<SetupHooks>().unwrap(),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    async fn run_host(parallel: bool) -> (ModHost, LoadSummary) {
        let registry: Arc<dyn ModClassLoader> = Arc::new(registry_with_failing_setup());
        let mut host = ModHost::new(LoaderEnvironment::new(Dist::Client), parallel);
        host.add_mod(&entry("good", "demo::ExampleMod"), registry.clone()).unwrap();
        host.add_mod(&entry("bad", "test::Failing"), registry.clone()).unwrap();
        host.add_mod(&entry("missing", "test::Missing"), registry).unwrap();

        let summary = host.run_stages().await;
        (host, summary)
    }

    #[tokio::test]
    async fn test_failed_mods_are_dropped_and_others_finish() {
        for parallel in [false, true] {
            let (host, summary) = run_host(parallel).await;

            assert_eq!(summary.loaded, vec!["good".to_string()]);
            assert_eq!(summary.failures.len(), 2);

            let missing = summary.failures.iter().find(|f| f.mod_id() == "missing").unwrap();
            assert_eq!(missing.stage, Stage::Construct);
            assert_eq!(missing.message_key, keys::FAILED_TO_LOAD_MOD_CLASS);

            let bad = summary.failures.iter().find(|f| f.mod_id() == "bad").unwrap();
            assert_eq!(bad.stage, Stage::CommonSetup);
            assert_eq!(bad.message_key, keys::ERROR_DURING_EVENT);

            let good = host.container("good").unwrap();
            assert_eq!(good.lock().current_stage(), Some(Stage::GatherData));
            let bad = host.container("bad").unwrap();
            assert!(bad.lock().is_errored());
        }
    }

    #[tokio::test]
    async fn test_duplicate_mod_is_rejected() {
        let registry: Arc<dyn ModClassLoader> = Arc::new(demo::registry());
        let mut host = ModHost::new(LoaderEnvironment::new(Dist::Client), false);
        host.add_mod(&entry("good", "demo::ExampleMod"), registry.clone()).unwrap();

        assert!(host.add_mod(&entry("good", "demo::ExampleMod"), registry).is_err());
        assert_eq!(host.mod_count(), 1);
    }

    #[tokio::test]
    async fn test_default_config_runs_demo_mod() {
        let config = AppConfig::default();
        let registry = demo::registry();
        let class_loader: Arc<dyn ModClassLoader> = Arc::new(registry.clone());
        let mut host = ModHost::new(LoaderEnvironment::new(config.loader.dist), false);
        for entry in &config.mods {
            host.add_mod(entry, class_loader.clone()).unwrap();
        }

        let summary = host.run_stages().await;
        assert!(summary.is_success());
        assert_eq!(
            setup_hooks(&registry).seen(),
            vec!["examplemod:common_setup", "examplemod:enqueue_imc"]
        );

        assert_eq!(host.load_configs(), 1);
        let container = host.container("examplemod").unwrap();
        let instance = container.lock().mod_as::<ExampleMod>().unwrap();
        assert_eq!(instance.config_loads(), 1);
        assert_eq!(host.owner_of(&*instance).as_deref(), Some("examplemod"));

        host.shutdown();
        assert!(container.lock().event_bus().is_shutdown());
    }

    #[tokio::test]
    async fn test_server_side_skips_client_subscribers() {
        let mut config = AppConfig::default();
        config.mods[0].subscribers = vec![
            SubscriberAnnotation::new("demo::SetupHooks").sides([Dist::Client]),
            SubscriberAnnotation::new("demo::ClientHooks").sides([Dist::Client]),
        ];
        let registry = demo::registry();
        let mut host = ModHost::new(LoaderEnvironment::new(Dist::DedicatedServer), true);
        host.add_mod(&config.mods[0], Arc::new(registry.clone())).unwrap();

        let summary = host.run_stages().await;
        assert!(summary.is_success());

        let loaded = registry.load_type("demo::SetupHooks").unwrap();
        match loaded.kind() {
            TypeKind::Object(cell) => assert!(cell.get().is_none()),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    struct FragileHooks;

    #[tokio::test]
    async fn test_panicking_subscriber_only_fails_its_own_mod() {
        for parallel in [false, true] {
            let mut registry = demo::registry();
            registry.register(LoadedType::object(
                "test::FragileHooks",
                |_: &ModLoadingContext| -> anyhow::Result<FragileHooks> {
                    panic!("fragile hooks cannot start")
                },
            ));
            let registry: Arc<dyn ModClassLoader> = Arc::new(registry);

            let mut bad = entry("bad", "demo::ExampleMod");
            bad.subscribers = vec![SubscriberAnnotation::new("test::FragileHooks")];
            let mut host = ModHost::new(LoaderEnvironment::new(Dist::Client), parallel);
            host.add_mod(&bad, registry.clone()).unwrap();
            host.add_mod(&entry("good", "demo::ExampleMod"), registry).unwrap();

            let summary = host.run_stages().await;
            assert_eq!(summary.loaded, vec!["good".to_string()]);
            assert_eq!(summary.failures.len(), 1);
            let failure = &summary.failures[0];
            assert_eq!(failure.mod_id(), "bad");
            assert_eq!(failure.stage, Stage::Construct);
            assert_eq!(failure.message_key, keys::FAILED_TO_LOAD_MOD);

            let good = host.container("good").unwrap();
            assert_eq!(good.lock().current_stage(), Some(Stage::GatherData));
        }
    }

    #[tokio::test]
    async fn test_reload_posts_only_changed_configs() {
        let mut config = AppConfig::default();
        let class_loader: Arc<dyn ModClassLoader> = Arc::new(demo::registry());
        let mut host = ModHost::new(LoaderEnvironment::new(config.loader.dist), false);
        for entry in &config.mods {
            host.add_mod(entry, class_loader.clone()).unwrap();
        }
        assert!(host.run_stages().await.is_success());
        assert_eq!(host.load_configs(), 1);

        let reloads = Arc::new(Mutex::new(Vec::new()));
        let seen = reloads.clone();
        let container = host.container("examplemod").unwrap();
        container
            .lock()
            .event_bus()
            .add_listener(Priority::NORMAL, move |event: &mut ModConfigEvent| {
                if event.kind == ConfigEventKind::Reloading {
                    seen.lock().push(event.config.get("greeting").cloned());
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(host.reload_configs(&config.mods), 0);
        assert!(reloads.lock().is_empty());

        config.mods[0].config = Some(serde_json::json!({ "greeting": "howdy", "verbose": true }));
        assert_eq!(host.reload_configs(&config.mods), 1);
        assert_eq!(*reloads.lock(), vec![Some(serde_json::json!("howdy"))]);
    }

    #[tokio::test]
    async fn test_owner_of_unknown_object() {
        let host = ModHost::new(LoaderEnvironment::new(Dist::Client), false);
        assert!(host.owner_of(&42u32).is_none());
    }
}
