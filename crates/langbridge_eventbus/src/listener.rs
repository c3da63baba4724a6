//! Listener adapter: normalizes every supported calling convention into one invoker.
//!
//! A listener can be declared three ways:
//!
//! - **Bound method**: a method on a receiver instance the caller owns.
//! - **Object function**: a member of a singleton object.
//! - **Free function**: a plain function value or closure with no receiver.
//!
//! [`ListenerAdapter::adapt`] checks the declared signature and binds the
//! receiver once, at registration time. Dispatch then calls a single
//! `Fn(&mut dyn Event)` without inspecting the declaration again.

use crate::error::{EventError, ListenerError, ListenerResult};
use crate::event::{instance_of, Event, EventFilter};
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type-erased receiver of a bound method or object function.
pub type Receiver = Arc<dyn Any + Send + Sync>;

/// Member body taking the receiver and the event.
pub type MemberFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &mut dyn Event) -> ListenerResult + Send + Sync>;

/// Body of a free function listener.
pub type FreeFn = Arc<dyn Fn(&mut dyn Event) -> ListenerResult + Send + Sync>;

/// Parameter descriptor of a declared listener member.
#[derive(Clone)]
pub struct ParamType {
    pub type_name: &'static str,
    /// Present iff the parameter type is assignable from `Event`.
    pub event_filter: Option<EventFilter>,
}

impl ParamType {
    /// Parameter of event type (or family marker) `E`.
    pub fn event<E: Any>() -> Self {
        Self {
            type_name: type_name::<E>(),
            event_filter: Some(instance_of::<E>()),
        }
    }

    /// Parameter of a type that is not an event.
    pub fn plain<T: ?Sized>() -> Self {
        Self {
            type_name: type_name::<T>(),
            event_filter: None,
        }
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamType")
            .field("type_name", &self.type_name)
            .field("is_event", &self.event_filter.is_some())
            .finish()
    }
}

/// Declared return type of a listener member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Unit,
    Value(&'static str),
}

/// Expected receiver type of a bound method or object function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverType {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ReceiverType {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

/// Descriptor of a listener-shaped member.
#[derive(Debug, Clone)]
pub struct ListenerSignature {
    pub name: String,
    pub receiver: Option<ReceiverType>,
    pub params: Vec<ParamType>,
    pub returns: ReturnType,
}

impl ListenerSignature {
    /// Signature of `fn(&mut E)` with no receiver.
    pub fn free<E: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            receiver: None,
            params: vec![ParamType::event::<E>()],
            returns: ReturnType::Unit,
        }
    }

    /// Signature of `fn(&T, &mut E)`.
    pub fn member<T: Any, E: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            receiver: Some(ReceiverType::of::<T>()),
            params: vec![ParamType::event::<E>()],
            returns: ReturnType::Unit,
        }
    }
}

/// Calling convention of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    BoundMethod,
    ObjectFunction,
    FreeFunction,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::BoundMethod => write!(f, "method"),
            ListenerKind::ObjectFunction => write!(f, "object"),
            ListenerKind::FreeFunction => write!(f, "function"),
        }
    }
}

/// A listener as declared by mod code, before validation.
pub enum DeclaredListener {
    BoundMethod {
        receiver: Receiver,
        signature: ListenerSignature,
        body: MemberFn,
    },
    ObjectFunction {
        object: Receiver,
        signature: ListenerSignature,
        body: MemberFn,
    },
    FreeFunction {
        signature: ListenerSignature,
        body: FreeFn,
    },
}

impl DeclaredListener {
    /// Free function or closure listening for `E`.
    pub fn function<E, F>(name: impl Into<String>, f: F) -> Self
    where
        E: Event,
        F: Fn(&mut E) -> ListenerResult + Send + Sync + 'static,
    {
        Self::FreeFunction {
            signature: ListenerSignature::free::<E>(name),
            body: typed_free(f),
        }
    }

    /// Method `f` bound to `receiver`, listening for `E`.
    pub fn method<T, E, F>(receiver: Arc<T>, name: impl Into<String>, f: F) -> Self
    where
        T: Any + Send + Sync,
        E: Event,
        F: Fn(&T, &mut E) -> ListenerResult + Send + Sync + 'static,
    {
        Self::BoundMethod {
            receiver,
            signature: ListenerSignature::member::<T, E>(name),
            body: typed_member(f),
        }
    }

    /// Member `f` of the singleton `object`, listening for `E`.
    pub fn object<T, E, F>(object: Arc<T>, name: impl Into<String>, f: F) -> Self
    where
        T: Any + Send + Sync,
        E: Event,
        F: Fn(&T, &mut E) -> ListenerResult + Send + Sync + 'static,
    {
        Self::ObjectFunction {
            object,
            signature: ListenerSignature::member::<T, E>(name),
            body: typed_member(f),
        }
    }

    pub fn kind(&self) -> ListenerKind {
        match self {
            Self::BoundMethod { .. } => ListenerKind::BoundMethod,
            Self::ObjectFunction { .. } => ListenerKind::ObjectFunction,
            Self::FreeFunction { .. } => ListenerKind::FreeFunction,
        }
    }

    pub fn signature(&self) -> &ListenerSignature {
        match self {
            Self::BoundMethod { signature, .. }
            | Self::ObjectFunction { signature, .. }
            | Self::FreeFunction { signature, .. } => signature,
        }
    }
}

impl fmt::Debug for DeclaredListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclaredListener")
            .field("kind", &self.kind())
            .field("signature", self.signature())
            .finish()
    }
}

/// Wraps a typed member into a [`MemberFn`].
pub fn typed_member<T, E, F>(f: F) -> MemberFn
where
    T: Any + Send + Sync,
    E: Event,
    F: Fn(&T, &mut E) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(move |receiver: &(dyn Any + Send + Sync), event: &mut dyn Event| {
        let receiver = receiver.downcast_ref::<T>().ok_or_else(|| {
            ListenerError::failed(anyhow::anyhow!("receiver is not a {}", type_name::<T>()))
        })?;
        let event_name = event.event_name();
        let event = event.as_any_mut().downcast_mut::<E>().ok_or_else(|| {
            ListenerError::failed(anyhow::anyhow!(
                "{} delivered to a listener of {}",
                event_name,
                type_name::<E>()
            ))
        })?;
        f(receiver, event)
    })
}

/// Wraps a typed free function into a [`FreeFn`].
pub fn typed_free<E, F>(f: F) -> FreeFn
where
    E: Event,
    F: Fn(&mut E) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(move |event: &mut dyn Event| {
        let event_name = event.event_name();
        let event = event.as_any_mut().downcast_mut::<E>().ok_or_else(|| {
            ListenerError::failed(anyhow::anyhow!(
                "{} delivered to a listener of {}",
                event_name,
                type_name::<E>()
            ))
        })?;
        f(event)
    })
}

/// A validated listener with its receiver already bound.
#[derive(Clone)]
pub struct Listener {
    name: String,
    kind: ListenerKind,
    accepts: EventFilter,
    invoker: FreeFn,
}

impl Listener {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// Whether the declared parameter type accepts `event`.
    pub fn accepts(&self, event: &dyn Event) -> bool {
        (self.accepts)(event)
    }

    pub fn invoke(&self, event: &mut dyn Event) -> ListenerResult {
        (self.invoker)(event)
    }

    pub(crate) fn filter(&self) -> EventFilter {
        self.accepts.clone()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Turns declared listeners into [`Listener`]s.
pub struct ListenerAdapter;

impl ListenerAdapter {
    /// Validates `declared` and binds its receiver.
    ///
    /// Fails with [`EventError::InvalidListener`] unless the member takes exactly
    /// one parameter assignable from `Event`, returns nothing, and (for bound
    /// and object members) the receiver has the declared receiver type.
    pub fn adapt(declared: DeclaredListener) -> Result<Listener, EventError> {
        let kind = declared.kind();
        let accepts = Self::check_signature(declared.signature())?;

        let (name, invoker): (String, FreeFn) = match declared {
            DeclaredListener::FreeFunction { signature, body } => (signature.name, body),
            DeclaredListener::BoundMethod {
                receiver,
                signature,
                body,
            }
            | DeclaredListener::ObjectFunction {
                object: receiver,
                signature,
                body,
            } => {
                Self::check_receiver(&signature, &receiver)?;
                let invoker: FreeFn = Arc::new(move |event: &mut dyn Event| body(&*receiver, event));
                (signature.name, invoker)
            }
        };

        Ok(Listener {
            name,
            kind,
            accepts,
            invoker,
        })
    }

    fn check_signature(signature: &ListenerSignature) -> Result<EventFilter, EventError> {
        if signature.params.len() != 1 {
            return Err(EventError::invalid(
                &signature.name,
                format!(
                    "expected exactly one event parameter, found {}",
                    signature.params.len()
                ),
            ));
        }

        if let ReturnType::Value(returned) = signature.returns {
            return Err(EventError::invalid(
                &signature.name,
                format!("listeners must return nothing, found return type {}", returned),
            ));
        }

        let param = &signature.params[0];
        param.event_filter.clone().ok_or_else(|| {
            EventError::invalid(
                &signature.name,
                format!("parameter type {} is not an event", param.type_name),
            )
        })
    }

    fn check_receiver(signature: &ListenerSignature, receiver: &Receiver) -> Result<(), EventError> {
        let expected = signature.receiver.ok_or_else(|| {
            EventError::invalid(&signature.name, "member listener declares no receiver type")
        })?;

        if Any::type_id(&**receiver) != expected.type_id {
            return Err(EventError::invalid(
                &signature.name,
                format!("receiver is not a {}", expected.type_name),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_event;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct Tick {
        count: u32,
    }
    impl_event!(Tick);

    #[derive(Debug, Default)]
    struct Other;
    impl_event!(Other);

    #[derive(Default)]
    struct Counter {
        seen: AtomicU32,
    }

    #[test]
    fn test_free_function_adapts_and_invokes() {
        let listener = ListenerAdapter::adapt(DeclaredListener::function("bump", |e: &mut Tick| {
            e.count += 1;
            Ok(())
        }))
        .unwrap();

        let mut tick = Tick::default();
        assert!(listener.accepts(&tick));
        assert!(!listener.accepts(&Other));
        listener.invoke(&mut tick).unwrap();
        assert_eq!(tick.count, 1);
        assert_eq!(listener.kind(), ListenerKind::FreeFunction);
    }

    #[test]
    fn test_bound_method_uses_receiver() {
        let counter = Arc::new(Counter::default());
        let listener = ListenerAdapter::adapt(DeclaredListener::method(
            counter.clone(),
            "Counter::on_tick",
            |c: &Counter, _e: &mut Tick| {
                c.seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ))
        .unwrap();

        listener.invoke(&mut Tick::default()).unwrap();
        listener.invoke(&mut Tick::default()).unwrap();
        assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
        assert_eq!(listener.kind(), ListenerKind::BoundMethod);
    }

    #[test]
    fn test_two_parameters_rejected() {
        let mut signature = ListenerSignature::free::<Tick>("two_args");
        signature.params.push(ParamType::plain::<u32>());
        let declared = DeclaredListener::FreeFunction {
            signature,
            body: Arc::new(|_: &mut dyn Event| Ok(())),
        };

        let err = ListenerAdapter::adapt(declared).unwrap_err();
        assert!(matches!(err, EventError::InvalidListener { ref listener, .. } if listener == "two_args"));
    }

    #[test]
    fn test_non_unit_return_rejected() {
        let mut signature = ListenerSignature::free::<Tick>("returns_bool");
        signature.returns = ReturnType::Value("bool");
        let declared = DeclaredListener::FreeFunction {
            signature,
            body: Arc::new(|_: &mut dyn Event| Ok(())),
        };

        let err = ListenerAdapter::adapt(declared).unwrap_err();
        assert!(err.to_string().contains("return nothing"));
    }

    #[test]
    fn test_non_event_parameter_rejected() {
        let signature = ListenerSignature {
            name: "takes_string".into(),
            receiver: None,
            params: vec![ParamType::plain::<String>()],
            returns: ReturnType::Unit,
        };
        let declared = DeclaredListener::FreeFunction {
            signature,
            body: Arc::new(|_: &mut dyn Event| Ok(())),
        };

        let err = ListenerAdapter::adapt(declared).unwrap_err();
        assert!(err.to_string().contains("not an event"));
    }

    #[test]
    fn test_receiver_mismatch_rejected() {
        let declared = DeclaredListener::ObjectFunction {
            object: Arc::new(42u64),
            signature: ListenerSignature::member::<Counter, Tick>("Counter::on_tick"),
            body: typed_member(|_c: &Counter, _e: &mut Tick| Ok(())),
        };

        let err = ListenerAdapter::adapt(declared).unwrap_err();
        assert!(err.to_string().contains("receiver is not a"));
    }
}
