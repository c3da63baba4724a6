//! Helper macros for declaring events.

/// Implements [`Event`](crate::Event) for a type.
///
/// Family markers listed after a colon make the event an instance of each
/// marker as far as [`Event::is_a`](crate::Event::is_a) and listener filters are
/// concerned.
///
/// ```rust
/// use langbridge_eventbus::{impl_event, Event};
///
/// #[derive(Debug)]
/// struct SetupFamily;
///
/// #[derive(Debug)]
/// struct ClientSetup { ticks: u32 }
///
/// impl_event!(ClientSetup: SetupFamily);
///
/// let event = ClientSetup { ticks: 0 };
/// assert!(event.is_a(std::any::TypeId::of::<SetupFamily>()));
/// ```
#[macro_export]
macro_rules! impl_event {
    ($ty:ty $(: $($family:ty),+ )?) => {
        impl $crate::Event for $ty {
            fn event_name(&self) -> &'static str {
                stringify!($ty)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn is_a(&self, kind: ::std::any::TypeId) -> bool {
                kind == ::std::any::TypeId::of::<$ty>()
                    || kind == ::std::any::TypeId::of::<$crate::AnyEvent>()
                    $($( || kind == ::std::any::TypeId::of::<$family>() )+)?
            }
        }
    };
}
