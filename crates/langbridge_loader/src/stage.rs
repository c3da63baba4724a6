//! Loading stages and the notifications that carry them.

use langbridge_eventbus::Event;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the fixed mod-loading sequence, in dispatch order.
///
/// `Error` is terminal: once a mod reaches it no further stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Construct,
    CreateRegistries,
    LoadRegistries,
    CommonSetup,
    SidedSetup,
    EnqueueImc,
    ProcessImc,
    Complete,
    GatherData,
    Error,
}

impl Stage {
    /// Every stage the host dispatches, in order. `Error` is never dispatched.
    pub const ALL_DISPATCH: [Stage; 9] = [
        Stage::Construct,
        Stage::CreateRegistries,
        Stage::LoadRegistries,
        Stage::CommonSetup,
        Stage::SidedSetup,
        Stage::EnqueueImc,
        Stage::ProcessImc,
        Stage::Complete,
        Stage::GatherData,
    ];

    /// The stage dispatched after this one, if any.
    pub fn next(self) -> Option<Stage> {
        let index = Self::ALL_DISPATCH.iter().position(|s| *s == self)?;
        Self::ALL_DISPATCH.get(index + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Construct => "construct",
            Stage::CreateRegistries => "create_registries",
            Stage::LoadRegistries => "load_registries",
            Stage::CommonSetup => "common_setup",
            Stage::SidedSetup => "sided_setup",
            Stage::EnqueueImc => "enqueue_imc",
            Stage::ProcessImc => "process_imc",
            Stage::Complete => "complete",
            Stage::GatherData => "gather_data",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical side the loader runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dist {
    Client,
    DedicatedServer,
}

impl Dist {
    pub fn all() -> Vec<Dist> {
        vec![Dist::Client, Dist::DedicatedServer]
    }
}

impl fmt::Display for Dist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dist::Client => f.write_str("client"),
            Dist::DedicatedServer => f.write_str("dedicated_server"),
        }
    }
}

/// A stage change delivered by the host, optionally with a pre-built event.
#[derive(Debug)]
pub struct LifecycleNotification {
    pub stage: Stage,
    pub event: Option<Box<dyn Event>>,
}

impl LifecycleNotification {
    pub fn new(stage: Stage) -> Self {
        Self { stage, event: None }
    }

    /// Notification whose event is posted as-is instead of being built.
    pub fn with_event(stage: Stage, event: Box<dyn Event>) -> Self {
        Self {
            stage,
            event: Some(event),
        }
    }
}
