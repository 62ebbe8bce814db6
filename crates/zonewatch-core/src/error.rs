//! Error types for graph construction, configuration and runtime faults.

use thiserror::Error;

use crate::controller::GraphState;
use crate::framework::{PortId, StageId, StatusMessage};

/// Errors raised while assembling the processing graph.
///
/// Any of these aborts the build; the partially assembled pipeline is
/// disposed before the error reaches the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    /// Stream configuration handed to the builder is unusable
    #[error("invalid stream configuration: {0}")]
    Config(String),

    /// The top-level pipeline container could not be created
    #[error("unable to create pipeline '{0}'")]
    Pipeline(String),

    /// A source bin container could not be created
    #[error("unable to create bin '{0}'")]
    Bin(String),

    /// A stage factory refused to produce an element
    #[error("unable to create stage '{name}' from factory '{factory}'")]
    Stage { factory: String, name: String },

    /// A static, request or ghost port is missing
    #[error("unable to get port '{port}' on '{stage}'")]
    Port { stage: String, port: String },

    /// Two stages or ports refused to link
    #[error("failed to link '{from}' to '{to}'")]
    Link { from: String, to: String },

    /// A stage rejected a configuration property
    #[error("unable to set '{key}' on '{stage}'")]
    Property { stage: String, key: String },

    /// The decoder negotiated video outside the accelerated memory domain
    #[error("unexpected decoder output: {0}")]
    UnexpectedDecoderOutput(String),

    /// The source bin's output port could not be pointed at the decoder
    #[error("failed to bind output port of '{0}' to the decoder")]
    GhostTarget(String),

    /// Hook, probe or status registration failed
    #[error("registration failed: {0}")]
    Registration(String),
}

/// Errors reported by a [`MediaFramework`](crate::framework::MediaFramework)
/// implementation. The builder adds stage context and turns these into
/// [`ConstructionError`]s.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameworkError {
    #[error("factory '{0}' is not available")]
    FactoryUnavailable(String),

    #[error("unknown stage {0:?}")]
    UnknownStage(StageId),

    #[error("unknown port {0:?}")]
    UnknownPort(PortId),

    #[error("stage {0:?} is not a bin")]
    NotABin(StageId),

    #[error("bin refused child '{0}'")]
    AddRefused(String),

    #[error("link refused: {0}")]
    LinkRefused(String),

    #[error("property '{key}' is not supported by {stage:?}")]
    PropertyUnsupported { stage: StageId, key: String },

    #[error("state change to {0} failed")]
    StateChange(String),
}

/// A fault surfaced on the status channel while the graph was playing.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("runtime fault from '{origin}': {message}")]
pub struct RuntimeFault {
    /// Name of the stage that posted the fault
    pub origin: String,
    /// Human-readable error text
    pub message: String,
    /// Optional debug detail from the framework
    pub debug: Option<String>,
}

impl RuntimeFault {
    pub(crate) fn channel_closed() -> Self {
        Self {
            origin: "status-channel".to_string(),
            message: "status channel closed before end of stream".to_string(),
            debug: None,
        }
    }
}

impl From<StatusMessage> for RuntimeFault {
    fn from(msg: StatusMessage) -> Self {
        Self {
            origin: msg.origin,
            message: msg.message,
            debug: msg.debug,
        }
    }
}

/// Errors found while loading or validating stream configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuration has no streams")]
    NoStreams,

    #[error("stream key '{0}' is not a stream index")]
    InvalidKey(String),

    #[error("stream indices must be contiguous from 0, missing {0}")]
    MissingStream(u32),

    #[error("stream {0} has an empty uri")]
    EmptyUri(u32),

    #[error("stream {stream} confidence must be between 0.0 and 1.0, got {value}")]
    InvalidConfidence { stream: u32, value: f32 },

    #[error("stream {stream} zone {zone} has no segments")]
    EmptyZone { stream: u32, zone: usize },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Runtime(#[from] RuntimeFault),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("framework error: {0}")]
    Framework(#[from] FrameworkError),

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: GraphState,
    },
}

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
