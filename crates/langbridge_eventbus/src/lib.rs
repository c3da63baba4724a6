//! # Langbridge Event Bus
//!
//! Ordered, fault-isolating publish mechanism used by every mod container.
//!
//! ## Key Features
//!
//! - **Priority ordering**: listeners fire in ascending [`Priority`]; equal
//!   priorities keep registration order
//! - **Fault isolation**: a failing or panicking listener is reported to the
//!   [`ExceptionHandler`] and the remaining listeners still run
//! - **Calling conventions**: bound methods, singleton object functions and
//!   free functions are adapted once, at registration time, by
//!   [`ListenerAdapter`]
//! - **Explicit stage abort**: a listener returning
//!   [`ListenerError::AbortStage`] latches a [`StageAbort`] on the bus, which
//!   the lifecycle coordinator turns into a stage failure
//!
//! ## Usage
//!
//! ```rust
//! use langbridge_eventbus::{impl_event, EventBus, Priority};
//!
//! #[derive(Debug, Default)]
//! struct Greeting {
//!     lines: Vec<String>,
//! }
//! impl_event!(Greeting);
//!
//! let bus = EventBus::builder().name("example").build();
//! bus.add_listener(Priority::LOW, |g: &mut Greeting| {
//!     g.lines.push("second".into());
//!     Ok(())
//! })
//! .unwrap();
//! bus.add_listener(Priority::HIGH, |g: &mut Greeting| {
//!     g.lines.push("first".into());
//!     Ok(())
//! })
//! .unwrap();
//!
//! let greeting = bus.post(Greeting::default());
//! assert_eq!(greeting.lines, vec!["first", "second"]);
//! ```

pub mod bus;
pub mod error;
pub mod event;
pub mod exception;
pub mod listener;
mod macros;

pub use bus::{
    BusStats, DispatchReport, EventBus, EventBusBuilder, Priority, Registration, RegistrationId,
    StageAbort,
};
pub use error::{EventError, ListenerError, ListenerResult};
pub use event::{accept_all, both, instance_of, AnyEvent, Event, EventFilter};
pub use exception::{EventBusErrorMessage, ExceptionHandler, LoggingExceptionHandler};
pub use listener::{
    typed_free, typed_member, DeclaredListener, FreeFn, Listener, ListenerAdapter, ListenerKind,
    ListenerSignature, MemberFn, ParamType, Receiver, ReceiverType, ReturnType,
};
