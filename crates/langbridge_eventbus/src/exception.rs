//! Exception sink for listener failures.
//!
//! The bus calls the configured [`ExceptionHandler`] once for every listener
//! that fails during a post, then moves on to the next listener. Handlers only
//! report; they cannot stop or reorder dispatch.

use crate::bus::{EventBus, Registration};
use crate::error::ListenerError;
use crate::event::Event;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Receives every listener failure observed during a post.
pub trait ExceptionHandler: Send + Sync {
    /// Called with the bus, the event being posted, every registration in the
    /// post snapshot, the index of the failing one, and its error.
    ///
    /// Implementations must not panic; a panic is caught and logged by the bus.
    fn on_failure(
        &self,
        bus: &EventBus,
        event: &dyn Event,
        listeners: &[Arc<Registration>],
        index: usize,
        error: &ListenerError,
    );
}

/// Default handler: logs one error record per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn on_failure(
        &self,
        bus: &EventBus,
        event: &dyn Event,
        listeners: &[Arc<Registration>],
        index: usize,
        error: &ListenerError,
    ) {
        error!(
            bus = bus.name(),
            "{}",
            EventBusErrorMessage {
                event,
                index,
                listeners,
                error,
            }
        );
    }
}

/// Renders a listener failure with the full listener list for diagnostics.
pub struct EventBusErrorMessage<'a> {
    pub event: &'a dyn Event,
    pub index: usize,
    pub listeners: &'a [Arc<Registration>],
    pub error: &'a ListenerError,
}

impl fmt::Display for EventBusErrorMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Exception caught during firing event: {}", self.error)?;

        let mut source = std::error::Error::source(self.error);
        while let Some(cause) = source {
            writeln!(f, "\tCaused by: {}", cause)?;
            source = cause.source();
        }

        writeln!(f, "\tIndex: {}", self.index)?;
        writeln!(f, "\tEvent: {}", self.event.event_name())?;
        writeln!(f, "\tListeners:")?;
        for (i, registration) in self.listeners.iter().enumerate() {
            let marker = if i == self.index { "->" } else { "  " };
            writeln!(
                f,
                "\t\t{} {}: {} (priority {})",
                marker,
                i,
                registration.listener(),
                registration.priority().0
            )?;
        }
        Ok(())
    }
}
