//! Type resolution for mod code.
//!
//! The loader never inspects mod code itself. A [`ModClassLoader`] resolves a
//! type name into a [`LoadedType`]: how to get an instance of it and which of
//! its members are listener-shaped. [`TypeRegistry`] is the in-process
//! implementation used by the host and by tests.

use crate::context::ModLoadingContext;
use langbridge_eventbus::{
    typed_free, typed_member, Event, FreeFn, ListenerResult, ListenerSignature, MemberFn,
    Priority,
};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// A type-erased mod or subscriber instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Produces a fresh instance of a type.
pub type Initializer = Arc<dyn Fn(&ModLoadingContext) -> anyhow::Result<Instance> + Send + Sync>;

#[derive(Debug, Error)]
pub enum TypeLoadError {
    #[error("Type {0} not found")]
    NotFound(String),
    #[error("Type {name} failed to link")]
    LinkageFailed {
        name: String,
        #[source]
        cause: anyhow::Error,
    },
}

/// Lazily initialized instance of a singleton object type.
///
/// Initialization runs at most once successfully; every later access returns
/// the same instance.
pub struct ObjectCell {
    instance: OnceCell<Instance>,
    init: Initializer,
}

impl ObjectCell {
    pub fn new(init: Initializer) -> Self {
        Self {
            instance: OnceCell::new(),
            init,
        }
    }

    pub fn with_instance(instance: Instance) -> Self {
        Self {
            instance: OnceCell::with_value(instance),
            init: Arc::new(|_: &ModLoadingContext| {
                Err(anyhow::anyhow!("object instance was supplied up front"))
            }),
        }
    }

    /// Returns the instance, running the initializer if none exists yet.
    ///
    /// A panicking initializer is reported as an error and leaves the cell empty.
    pub fn get_or_init(&self, context: &ModLoadingContext) -> anyhow::Result<Instance> {
        self.instance
            .get_or_try_init(|| guarded("object initializer", || (self.init)(context)))
            .map(Arc::clone)
    }

    pub fn get(&self) -> Option<&Instance> {
        self.instance.get()
    }
}

/// How an instance of a type is obtained.
#[derive(Clone)]
pub enum TypeKind {
    /// Singleton object: one shared instance.
    Object(Arc<ObjectCell>),
    /// Regular type with a zero-argument constructor.
    Class(Initializer),
    /// Cannot be instantiated.
    Abstract,
}

impl fmt::Debug for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Object(cell) => write!(f, "Object(initialized: {})", cell.get().is_some()),
            TypeKind::Class(_) => write!(f, "Class"),
            TypeKind::Abstract => write!(f, "Abstract"),
        }
    }
}

/// Body of a listener-shaped member.
#[derive(Clone)]
pub enum MemberBody {
    /// Needs a receiver; only valid on object types.
    Instance(MemberFn),
    /// Static member with no receiver.
    Static(FreeFn),
}

/// A listener-shaped member of a loaded type.
#[derive(Clone)]
pub struct MemberDecl {
    pub signature: ListenerSignature,
    pub body: MemberBody,
    pub priority: Priority,
}

impl MemberDecl {
    /// Instance member `f` on receiver type `T`, listening for `E`.
    pub fn instance<T, E, F>(name: impl Into<String>, priority: Priority, f: F) -> Self
    where
        T: Any + Send + Sync,
        E: Event,
        F: Fn(&T, &mut E) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            signature: ListenerSignature::member::<T, E>(name),
            body: MemberBody::Instance(typed_member(f)),
            priority,
        }
    }

    /// Static member `f` listening for `E`.
    pub fn static_fn<E, F>(name: impl Into<String>, priority: Priority, f: F) -> Self
    where
        E: Event,
        F: Fn(&mut E) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            signature: ListenerSignature::free::<E>(name),
            body: MemberBody::Static(typed_free(f)),
            priority,
        }
    }

    /// Member described by an arbitrary signature, validated only at registration.
    pub fn raw(signature: ListenerSignature, body: MemberBody, priority: Priority) -> Self {
        Self {
            signature,
            body,
            priority,
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }
}

impl fmt::Debug for MemberDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match self.body {
            MemberBody::Instance(_) => "instance",
            MemberBody::Static(_) => "static",
        };
        f.debug_struct("MemberDecl")
            .field("signature", &self.signature)
            .field("body", &body)
            .field("priority", &self.priority)
            .finish()
    }
}

/// A resolved type.
#[derive(Debug, Clone)]
pub struct LoadedType {
    name: String,
    kind: TypeKind,
    members: Vec<MemberDecl>,
}

impl LoadedType {
    /// Singleton object type whose instance is built on first access.
    pub fn object<T, F>(name: impl Into<String>, init: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ModLoadingContext) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let init: Initializer =
            Arc::new(move |context: &ModLoadingContext| Ok(Arc::new(init(context)?) as Instance));
        Self::with_kind(name, TypeKind::Object(Arc::new(ObjectCell::new(init))))
    }

    /// Singleton object type with an already existing instance.
    pub fn object_instance<T: Any + Send + Sync>(name: impl Into<String>, instance: Arc<T>) -> Self {
        Self::with_kind(
            name,
            TypeKind::Object(Arc::new(ObjectCell::with_instance(instance))),
        )
    }

    /// Regular type constructed by `ctor` every time it is instantiated.
    pub fn class<T, F>(name: impl Into<String>, ctor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ModLoadingContext) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let init: Initializer =
            Arc::new(move |context: &ModLoadingContext| Ok(Arc::new(ctor(context)?) as Instance));
        Self::with_kind(name, TypeKind::Class(init))
    }

    pub fn abstract_type(name: impl Into<String>) -> Self {
        Self::with_kind(name, TypeKind::Abstract)
    }

    fn with_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, member: MemberDecl) -> Self {
        self.members.push(member);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn members(&self) -> &[MemberDecl] {
        &self.members
    }
}

/// Resolves type names within one mod's code.
pub trait ModClassLoader: Send + Sync {
    fn load_type(&self, name: &str) -> Result<LoadedType, TypeLoadError>;

    /// Short description used in log lines.
    fn describe(&self) -> String {
        "class loader".to_string()
    }
}

/// In-process [`ModClassLoader`] backed by a name table.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    name: String,
    types: HashMap<String, LoadedType>,
    broken: HashMap<String, String>,
}

impl TypeRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn register(&mut self, loaded: LoadedType) -> &mut Self {
        self.broken.remove(loaded.name());
        self.types.insert(loaded.name().to_string(), loaded);
        self
    }

    /// Declares a type that exists but fails to link when loaded.
    pub fn register_broken(&mut self, name: impl Into<String>, reason: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.types.remove(&name);
        self.broken.insert(name, reason.into());
        self
    }

    pub fn with_type(mut self, loaded: LoadedType) -> Self {
        self.register(loaded);
        self
    }
}

impl ModClassLoader for TypeRegistry {
    fn load_type(&self, name: &str) -> Result<LoadedType, TypeLoadError> {
        if let Some(reason) = self.broken.get(name) {
            return Err(TypeLoadError::LinkageFailed {
                name: name.to_string(),
                cause: anyhow::anyhow!("{}", reason),
            });
        }
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| TypeLoadError::NotFound(name.to_string()))
    }

    fn describe(&self) -> String {
        format!("type registry {} ({} types)", self.name, self.types.len())
    }
}

/// Runs mod code, turning a panic into an error.
pub(crate) fn guarded<T>(what: &str, f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(anyhow::anyhow!("{} panicked: {}", what, panic_message(&*payload))))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ModInfo;
    use crate::stage::Dist;
    use langbridge_eventbus::EventBus;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context() -> ModLoadingContext {
        ModLoadingContext::new(
            ModInfo::new("demo"),
            Arc::new(EventBus::default()),
            Arc::new(EventBus::default()),
            Dist::Client,
        )
    }

    struct Settings {
        id: u32,
    }

    #[test]
    fn test_object_is_initialized_once_across_loads() {
        let built = Arc::new(AtomicU32::new(0));
        let counter = built.clone();
        let registry = TypeRegistry::new("demo").with_type(LoadedType::object(
            "demo::Settings",
            move |_: &ModLoadingContext| {
                Ok(Settings {
                    id: counter.fetch_add(1, Ordering::SeqCst),
                })
            },
        ));

        let ctx = context();
        let first = match registry.load_type("demo::Settings").unwrap().kind() {
            TypeKind::Object(cell) => cell.get_or_init(&ctx).unwrap(),
            other => panic!("unexpected kind {:?}", other),
        };
        let second = match registry.load_type("demo::Settings").unwrap().kind() {
            TypeKind::Object(cell) => cell.get_or_init(&ctx).unwrap(),
            other => panic!("unexpected kind {:?}", other),
        };

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(first.downcast_ref::<Settings>().unwrap().id, 0);
    }

    #[test]
    fn test_failed_object_init_can_be_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let cell = ObjectCell::new(Arc::new(move |_: &ModLoadingContext| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("not yet");
            }
            Ok(Arc::new(7u32) as Instance)
        }));

        let ctx = context();
        assert!(cell.get_or_init(&ctx).is_err());
        assert!(cell.get().is_none());
        assert_eq!(cell.get_or_init(&ctx).unwrap().downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn test_panicking_object_init_leaves_cell_empty() {
        let cell = ObjectCell::new(Arc::new(|_: &ModLoadingContext| -> anyhow::Result<Instance> {
            panic!("settings file unreadable")
        }));

        let err = cell.get_or_init(&context()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "object initializer panicked: settings file unreadable"
        );
        assert!(cell.get().is_none());
    }

    #[test]
    fn test_missing_and_broken_types() {
        let mut registry = TypeRegistry::new("demo");
        registry.register_broken("demo::Broken", "missing dependency other::Api");

        assert!(matches!(
            registry.load_type("demo::Nope"),
            Err(TypeLoadError::NotFound(ref name)) if name == "demo::Nope"
        ));
        let err = registry.load_type("demo::Broken").unwrap_err();
        assert!(matches!(err, TypeLoadError::LinkageFailed { .. }));
        assert_eq!(
            std::error::Error::source(&err).unwrap().to_string(),
            "missing dependency other::Api"
        );
    }
}
