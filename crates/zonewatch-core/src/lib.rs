//! Zonewatch Core
//!
//! Assembles a multi-stream video analytics graph from runtime configuration
//! and checks, frame by frame, whether tracked people step into restricted
//! zones.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────────────┐
//! │ AppConfig   │────▶│ TopologyBuilder │────▶│ EventLoopController │
//! │ (per-stream)│     │ (stage arena)   │     │ (status loop)       │
//! └─────────────┘     └────────┬────────┘     └─────────────────────┘
//!                              │ probe on branch port
//!                              ▼
//!                     ┌──────────────────┐     ┌─────────────────────┐
//!                     │ ZoneViolation    │────▶│ EventRecord         │
//!                     │ Probe (dataflow) │     │ duplicate / release │
//!                     └──────────────────┘     └─────────────────────┘
//! ```
//!
//! The decode, inference, compositing and publishing stages belong to an
//! external media framework, reached through the [`MediaFramework`] trait.
//! [`MemoryFramework`] is an in-process implementation for tests and dry runs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zonewatch_core::{AppConfig, BuildParams, EventLoopController, MemoryFramework, TopologyBuilder};
//!
//! let config = AppConfig::from_path("config.json")?;
//! let params = BuildParams::new("/opt/proto/libkafka.so", "localhost;9092");
//! let graph = TopologyBuilder::new(Arc::new(MemoryFramework::new()), params).build(config.streams)?;
//!
//! let mut controller = EventLoopController::new(graph);
//! controller.run()?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod framework;
pub mod geometry;
pub mod lifecycle;
pub mod probe;
pub mod source_bin;
pub mod topology;
pub mod tracing;
pub mod types;

// Re-export main types
pub use config::{AppConfig, BuildParams, Platform, StreamConfig};
pub use controller::{EventLoopController, GraphState};
pub use error::{ConfigError, ConstructionError, Error, FrameworkError, Result, RuntimeFault};
pub use framework::{
    MediaFramework, MemoryFramework, NegotiatedCaps, PipelineState, PropertyValue, StageId,
    StatusMessage, StatusSignal,
};
pub use geometry::{Point, Segment, Zone};
pub use lifecycle::{EventRecord, LifecycleHooks, LifecycleStats, MetadataLifecycleManager};
pub use probe::{ProbeReport, ZoneViolationProbe};
pub use source_bin::{create_source_bin, BindingState, PortBinding, SourceBin};
pub use topology::{tiler_grid, GraphHandle, StageRole, TilerGrid, Topology, TopologyBuilder};
pub use types::{BatchRecord, BoundingBox, Color, FrameRecord, ObjectDetection, OverlayLine};
