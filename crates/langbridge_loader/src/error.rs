//! Loading errors: configuration problems and stage failures.

use crate::class_loader::TypeLoadError;
use crate::metadata::ModInfo;
use crate::stage::Stage;
use langbridge_eventbus::EventError;
use thiserror::Error;

/// Message keys carried by [`ModLoadingError`].
pub mod keys {
    pub const FAILED_TO_LOAD_MOD_CLASS: &str = "modloading.failedtoloadmodclass";
    pub const FAILED_TO_LOAD_MOD: &str = "modloading.failedtoloadmod";
    pub const ERROR_DURING_EVENT: &str = "modloading.errorduringevent";
    pub const STAGE_OUT_OF_ORDER: &str = "modloading.stageoutoforder";
}

/// A mod is set up wrong. Always fatal to that mod.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to resolve type {type_name}")]
    TypeResolution {
        type_name: String,
        #[source]
        source: TypeLoadError,
    },
    #[error("Type {type_name} cannot be instantiated: {reason}")]
    NotInstantiable { type_name: String, reason: String },
    #[error("Failed to instantiate {type_name}")]
    Instantiation {
        type_name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to load subscriber type {type_name}")]
    SubscriberLoad {
        type_name: String,
        #[source]
        source: TypeLoadError,
    },
    #[error("Failed to initialize subscriber object {type_name}")]
    ObjectInit {
        type_name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Listener {member} needs a receiver but {type_name} is not an object")]
    InstanceListenerOnClass { type_name: String, member: String },
    #[error("Invalid listener on subscriber {type_name}")]
    InvalidListener {
        type_name: String,
        #[source]
        source: EventError,
    },
}

impl ConfigurationError {
    /// Type the error is about.
    pub fn type_name(&self) -> &str {
        match self {
            Self::TypeResolution { type_name, .. }
            | Self::NotInstantiable { type_name, .. }
            | Self::Instantiation { type_name, .. }
            | Self::SubscriberLoad { type_name, .. }
            | Self::ObjectInit { type_name, .. }
            | Self::InstanceListenerOnClass { type_name, .. }
            | Self::InvalidListener { type_name, .. } => type_name,
        }
    }
}

/// Stage-scoped failure raised to the host.
///
/// The host treats it as a failed mod load. `cause` keeps the full chain of the
/// original error.
#[derive(Debug, Error)]
#[error("Mod {} failed during {stage}: {message_key}", .mod_info.mod_id)]
pub struct ModLoadingError {
    pub mod_info: ModInfo,
    pub stage: Stage,
    pub message_key: &'static str,
    #[source]
    pub cause: anyhow::Error,
    pub offending_type: Option<String>,
}

impl ModLoadingError {
    pub fn new(
        mod_info: &ModInfo,
        stage: Stage,
        message_key: &'static str,
        cause: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            mod_info: mod_info.clone(),
            stage,
            message_key,
            cause: cause.into(),
            offending_type: None,
        }
    }

    pub fn with_offending_type(mut self, type_name: impl Into<String>) -> Self {
        self.offending_type = Some(type_name.into());
        self
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_info.mod_id
    }

    /// Whether the stage was rejected before it touched the mod.
    pub fn is_precondition(&self) -> bool {
        self.message_key == keys::STAGE_OUT_OF_ORDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_keeps_cause_chain() {
        let config = ConfigurationError::TypeResolution {
            type_name: "demo::Mod".into(),
            source: TypeLoadError::NotFound("demo::Mod".into()),
        };
        let err = ModLoadingError::new(
            &ModInfo::new("demo"),
            Stage::Construct,
            keys::FAILED_TO_LOAD_MOD_CLASS,
            config,
        )
        .with_offending_type("demo::Mod");

        assert_eq!(
            err.to_string(),
            "Mod demo failed during construct: modloading.failedtoloadmodclass"
        );
        let chain: Vec<String> = err.cause.chain().map(|e| e.to_string()).collect();
        assert_eq!(
            chain,
            vec!["Failed to resolve type demo::Mod", "Type demo::Mod not found"]
        );
        assert_eq!(err.offending_type.as_deref(), Some("demo::Mod"));
        assert!(!err.is_precondition());
    }
}
