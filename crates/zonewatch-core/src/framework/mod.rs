//! Media framework abstraction.
//!
//! The decode, batching, inference, compositing and publishing stages are
//! provided by an external media framework. The core only creates,
//! configures and links opaque stage handles through [`MediaFramework`].
//!
//! Implementations:
//!
//! - **Memory**: in-process implementation for tests and dry runs
//!   ([`MemoryFramework`])
//!
//! # Callbacks
//!
//! Pad-added, descendant-added, buffer probes and lifecycle hooks are
//! invoked by the framework on its own dataflow threads. Callbacks receive
//! the framework as `&dyn MediaFramework` so they never need to hold a
//! reference to it, and implementations must not hold internal locks while
//! calling them.

mod memory;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::Serialize;

use crate::error::{ConstructionError, FrameworkError};
use crate::lifecycle::LifecycleHooks;
use crate::types::BatchRecord;

pub use memory::{BatchDelivery, MemoryFramework};

/// Opaque handle to a stage (element, bin or pipeline)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StageId(pub u64);

/// Opaque handle to a port on a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PortId(pub u64);

/// Handle returned when a buffer probe is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId(pub u64);

/// Handle to an installed pair of lifecycle hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookSlot(pub u64);

/// Stage property value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Str(String),
}

impl PropertyValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Pipeline dataflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PipelineState {
    #[default]
    Null,
    Ready,
    Paused,
    Playing,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Ready => write!(f, "ready"),
            Self::Paused => write!(f, "paused"),
            Self::Playing => write!(f, "playing"),
        }
    }
}

/// Payload of a warning or error status signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    /// Name of the posting stage
    pub origin: String,
    pub message: String,
    pub debug: Option<String>,
}

impl StatusMessage {
    pub fn new(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            message: message.into(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }
}

/// Asynchronous notification carried on a pipeline's status channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StatusSignal {
    EndOfStream,
    Warning(StatusMessage),
    Error(StatusMessage),
}

/// Stream type and capability features negotiated on a new decoder port
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedCaps {
    /// Media type, e.g. `video/x-raw`
    pub media_type: String,
    /// Capability features, e.g. `memory:NVMM`
    pub features: Vec<String>,
}

impl NegotiatedCaps {
    pub fn new(media_type: impl Into<String>, features: &[&str]) -> Self {
        Self {
            media_type: media_type.into(),
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn is_video(&self) -> bool {
        self.media_type.starts_with("video/")
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

impl std::fmt::Display for NegotiatedCaps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.features.is_empty() {
            write!(f, "{}", self.media_type)
        } else {
            write!(f, "{}({})", self.media_type, self.features.join(", "))
        }
    }
}

/// A port a decoder created after negotiating its output
#[derive(Debug, Clone, PartialEq)]
pub struct NewPad {
    pub stage: StageId,
    pub port: PortId,
    pub caps: NegotiatedCaps,
}

/// Invoked once per dynamically created decoder port
pub type PadAddedCallback =
    Box<dyn Fn(&dyn MediaFramework, &NewPad) -> Result<(), ConstructionError> + Send + Sync>;

/// Invoked for every stage added anywhere below a bin
pub type DescendantAddedCallback = Box<dyn Fn(&dyn MediaFramework, StageId) + Send + Sync>;

/// What to do with a buffer after a probe ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReturn {
    /// Let the buffer continue downstream
    Pass,
    /// Drop the buffer
    Drop,
}

/// Per-buffer hook attached to a port
pub trait BufferProbe: Send + Sync {
    fn on_buffer(&self, batch: &mut BatchRecord) -> ProbeReturn;
}

/// Operations the core needs from the external media framework.
///
/// Stage creation failures surface as `Err`; lookups of optional things
/// (ports, properties, names) return `Option`.
pub trait MediaFramework: Send + Sync {
    /// Create an empty top-level pipeline container.
    fn new_pipeline(&self, name: &str) -> Result<StageId, FrameworkError>;

    /// Create an empty bin container.
    fn new_bin(&self, name: &str) -> Result<StageId, FrameworkError>;

    /// Create a stage from a named factory.
    fn make_stage(&self, factory: &str, name: &str) -> Result<StageId, FrameworkError>;

    /// Add `child` to the container `bin`.
    fn add(&self, bin: StageId, child: StageId) -> Result<(), FrameworkError>;

    /// Direct children of a container, in insertion order.
    fn children(&self, bin: StageId) -> Vec<StageId>;

    fn stage_name(&self, stage: StageId) -> Option<String>;

    /// Whether the stage declares the property (capability check).
    fn has_property(&self, stage: StageId, key: &str) -> bool;

    fn set_property(
        &self,
        stage: StageId,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), FrameworkError>;

    fn property(&self, stage: StageId, key: &str) -> Option<PropertyValue>;

    /// Look up an always-present port.
    fn static_port(&self, stage: StageId, name: &str) -> Option<PortId>;

    /// Request a port from a template such as `sink_0` or `src_%u`.
    fn request_port(&self, stage: StageId, template: &str) -> Option<PortId>;

    /// Name the framework gave a port, e.g. `src_1` for a `src_%u` request.
    fn port_name(&self, port: PortId) -> Option<String>;

    /// Add an output port to a bin with no target yet.
    fn add_ghost_port(&self, bin: StageId, name: &str) -> Result<PortId, FrameworkError>;

    /// Point a bin's ghost port at an inner port.
    fn set_ghost_target(&self, ghost: PortId, target: PortId) -> Result<(), FrameworkError>;

    fn link_ports(&self, src: PortId, sink: PortId) -> Result<(), FrameworkError>;

    /// Link the default output of `upstream` to the default input of `downstream`.
    fn link(&self, upstream: StageId, downstream: StageId) -> Result<(), FrameworkError>;

    fn connect_pad_added(
        &self,
        stage: StageId,
        callback: PadAddedCallback,
    ) -> Result<(), FrameworkError>;

    fn connect_descendant_added(
        &self,
        bin: StageId,
        callback: DescendantAddedCallback,
    ) -> Result<(), FrameworkError>;

    fn add_buffer_probe(
        &self,
        port: PortId,
        probe: Arc<dyn BufferProbe>,
    ) -> Result<ProbeId, FrameworkError>;

    /// Install the metadata duplicate/release callbacks for a pipeline.
    fn install_lifecycle_hooks(
        &self,
        pipeline: StageId,
        hooks: LifecycleHooks,
    ) -> Result<HookSlot, FrameworkError>;

    /// Remove installed hooks. Returns false if the slot was already empty.
    fn remove_lifecycle_hooks(&self, slot: HookSlot) -> bool;

    fn set_state(&self, pipeline: StageId, state: PipelineState) -> Result<(), FrameworkError>;

    /// Subscribe to a pipeline's status channel. The channel disconnects
    /// once the framework drops the pipeline.
    fn status_bus(&self, pipeline: StageId) -> Result<Receiver<StatusSignal>, FrameworkError>;

    /// Destroy a pipeline or bin and everything it contains.
    fn dispose(&self, pipeline: StageId);
}
