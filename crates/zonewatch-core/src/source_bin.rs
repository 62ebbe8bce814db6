//! Per-stream decode sub-graphs.
//!
//! Each input stream gets a bin holding a URI decoder. The bin exposes one
//! output port whose target is unknown until the decoder negotiates its
//! output on a dataflow thread, so binding happens in two phases:
//!
//! 1. [`create_source_bin`] adds the output port with no target and
//!    registers a pad-added callback. The [`PortBinding`] is `Pending`.
//! 2. The callback inspects the negotiated caps and either points the
//!    output port at the decoder (`Bound`) or records the failure
//!    (`Failed`). The outcome is written once and never changes.

use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::error::ConstructionError;
use crate::framework::{MediaFramework, NewPad, PortId, StageId};

/// Factory of the decoder placed in every source bin
pub const DECODER_FACTORY: &str = "uridecodebin";

/// Capability feature of frames living in accelerator memory
pub const NVMM_FEATURE: &str = "memory:NVMM";

/// Property asking network sources to drop late data instead of buffering it
pub const LOW_LATENCY_PROPERTY: &str = "drop-on-latency";

/// Name of the source bin's output port
pub const OUTPUT_PORT: &str = "src";

const DECODER_NAME: &str = "uri-decode-bin";

/// Observable state of a source bin's output port
#[derive(Debug, Clone, PartialEq)]
pub enum BindingState {
    /// The decoder has not produced video yet
    Pending,
    /// Output port targets this decoder port
    Bound(PortId),
    /// The decoder produced output that cannot be used
    Failed(ConstructionError),
}

/// Single-assignment cell shared between the builder and the pad-added
/// callback.
#[derive(Debug, Clone, Default)]
pub struct PortBinding {
    cell: Arc<OnceLock<Result<PortId, ConstructionError>>>,
}

impl PortBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BindingState {
        match self.cell.get() {
            None => BindingState::Pending,
            Some(Ok(port)) => BindingState::Bound(*port),
            Some(Err(e)) => BindingState::Failed(e.clone()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Record the outcome. Returns false if it was already recorded.
    fn resolve(&self, outcome: Result<PortId, ConstructionError>) -> bool {
        self.cell.set(outcome).is_ok()
    }
}

/// A decode sub-graph for one input stream
#[derive(Debug, Clone)]
pub struct SourceBin {
    pub index: u32,
    pub name: String,
    pub bin: StageId,
    pub decoder: StageId,
    /// The bin's output port
    pub output: PortId,
    pub binding: PortBinding,
}

/// Name of the source bin for stream `index`
pub fn source_bin_name(index: u32) -> String {
    format!("source-bin-{index:02}")
}

/// Create the decode sub-graph for stream `index` reading from `uri`.
pub fn create_source_bin(
    fw: &dyn MediaFramework,
    index: u32,
    uri: &str,
) -> Result<SourceBin, ConstructionError> {
    let name = source_bin_name(index);
    debug!(bin = %name, uri, "creating source bin");

    let bin = fw
        .new_bin(&name)
        .map_err(|_| ConstructionError::Bin(name.clone()))?;

    populate_source_bin(fw, bin, index, name, uri).inspect_err(|_| fw.dispose(bin))
}

fn populate_source_bin(
    fw: &dyn MediaFramework,
    bin: StageId,
    index: u32,
    name: String,
    uri: &str,
) -> Result<SourceBin, ConstructionError> {
    let decoder = fw
        .make_stage(DECODER_FACTORY, DECODER_NAME)
        .map_err(|_| ConstructionError::Stage {
            factory: DECODER_FACTORY.to_string(),
            name: DECODER_NAME.to_string(),
        })?;
    fw.add(bin, decoder)
        .map_err(|e| ConstructionError::Registration(e.to_string()))?;

    fw.set_property(decoder, "uri", uri.into())
        .map_err(|_| ConstructionError::Property {
            stage: DECODER_NAME.to_string(),
            key: "uri".to_string(),
        })?;

    let output = fw
        .add_ghost_port(bin, OUTPUT_PORT)
        .map_err(|_| ConstructionError::Port {
            stage: name.clone(),
            port: OUTPUT_PORT.to_string(),
        })?;

    let binding = PortBinding::new();
    let on_pad = {
        let binding = binding.clone();
        let name = name.clone();
        move |fw: &dyn MediaFramework, pad: &NewPad| bind_output(fw, pad, output, &binding, &name)
    };
    fw.connect_pad_added(decoder, Box::new(on_pad))
        .map_err(|e| ConstructionError::Registration(e.to_string()))?;

    fw.connect_descendant_added(
        bin,
        Box::new(|fw: &dyn MediaFramework, child: StageId| {
            apply_low_latency_hint(fw, child);
        }),
    )
    .map_err(|e| ConstructionError::Registration(e.to_string()))?;
    apply_low_latency_hint(fw, bin);

    Ok(SourceBin {
        index,
        name,
        bin,
        decoder,
        output,
        binding,
    })
}

/// Pad-added handler: bind the bin output to the decoder's video port.
fn bind_output(
    fw: &dyn MediaFramework,
    pad: &NewPad,
    output: PortId,
    binding: &PortBinding,
    bin_name: &str,
) -> Result<(), ConstructionError> {
    if binding.is_resolved() {
        return Ok(());
    }

    if !pad.caps.is_video() {
        debug!(bin = bin_name, caps = %pad.caps, "ignoring non-video decoder output");
        return Ok(());
    }

    if !pad.caps.has_feature(NVMM_FEATURE) {
        let err = ConstructionError::UnexpectedDecoderOutput(format!(
            "{bin_name} negotiated {} without {NVMM_FEATURE}",
            pad.caps
        ));
        binding.resolve(Err(err.clone()));
        return Err(err);
    }

    match fw.set_ghost_target(output, pad.port) {
        Ok(()) => {
            binding.resolve(Ok(pad.port));
            debug!(bin = bin_name, "source output bound");
            Ok(())
        }
        Err(e) => {
            debug!(bin = bin_name, error = %e, "ghost target refused");
            let err = ConstructionError::GhostTarget(bin_name.to_string());
            binding.resolve(Err(err.clone()));
            Err(err)
        }
    }
}

/// Set the low-latency hint on every stage at or below `root` whose name
/// contains `source` and that supports it. Returns how many stages were
/// updated.
pub fn apply_low_latency_hint(fw: &dyn MediaFramework, root: StageId) -> usize {
    let mut applied = 0;
    let mut stack = vec![root];

    while let Some(stage) = stack.pop() {
        stack.extend(fw.children(stage));

        let Some(name) = fw.stage_name(stage) else {
            continue;
        };
        if !name.contains("source") || !fw.has_property(stage, LOW_LATENCY_PROPERTY) {
            continue;
        }
        match fw.set_property(stage, LOW_LATENCY_PROPERTY, true.into()) {
            Ok(()) => {
                debug!(stage = %name, "low-latency hint applied");
                applied += 1;
            }
            Err(e) => warn!(stage = %name, error = %e, "low-latency hint rejected"),
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{MemoryFramework, NegotiatedCaps, PropertyValue};

    fn nvmm_video() -> NegotiatedCaps {
        NegotiatedCaps::new("video/x-raw", &[NVMM_FEATURE])
    }

    #[test]
    fn test_source_bin_layout() {
        let fw = MemoryFramework::new();
        let source = create_source_bin(&fw, 3, "file:///videos/a.mp4").unwrap();

        assert_eq!(source.name, "source-bin-03");
        assert_eq!(fw.parent_of(source.decoder), Some(source.bin));
        assert_eq!(
            fw.property(source.decoder, "uri"),
            Some(PropertyValue::Str("file:///videos/a.mp4".into()))
        );
        assert_eq!(fw.port_name(source.output).as_deref(), Some("src"));
        assert_eq!(source.binding.state(), BindingState::Pending);
    }

    #[test]
    fn test_video_in_accelerated_memory_binds() {
        let fw = MemoryFramework::new();
        let source = create_source_bin(&fw, 0, "file:///a.mp4").unwrap();

        let port = fw.emit_pad_added(source.decoder, nvmm_video()).unwrap();
        assert_eq!(source.binding.state(), BindingState::Bound(port));
        assert_eq!(fw.ghost_target(source.output), Some(port));
    }

    #[test]
    fn test_audio_output_is_ignored() {
        let fw = MemoryFramework::new();
        let source = create_source_bin(&fw, 0, "file:///a.mp4").unwrap();

        fw.emit_pad_added(source.decoder, NegotiatedCaps::new("audio/x-raw", &[]))
            .unwrap();
        assert_eq!(source.binding.state(), BindingState::Pending);

        let port = fw.emit_pad_added(source.decoder, nvmm_video()).unwrap();
        assert_eq!(source.binding.state(), BindingState::Bound(port));
    }

    #[test]
    fn test_system_memory_video_fails() {
        let fw = MemoryFramework::new();
        let source = create_source_bin(&fw, 0, "file:///a.mp4").unwrap();

        let err = fw
            .emit_pad_added(source.decoder, NegotiatedCaps::new("video/x-raw", &[]))
            .unwrap_err();
        assert!(matches!(err, ConstructionError::UnexpectedDecoderOutput(_)));
        assert!(matches!(source.binding.state(), BindingState::Failed(_)));
        assert_eq!(fw.ghost_target(source.output), None);
    }

    #[test]
    fn test_binding_is_single_assignment() {
        let fw = MemoryFramework::new();
        let source = create_source_bin(&fw, 0, "file:///a.mp4").unwrap();

        let first = fw.emit_pad_added(source.decoder, nvmm_video()).unwrap();
        fw.emit_pad_added(source.decoder, nvmm_video()).unwrap();
        assert_eq!(source.binding.state(), BindingState::Bound(first));
    }

    #[test]
    fn test_decoder_failure_aborts() {
        let fw = MemoryFramework::new();
        fw.fail_factory(DECODER_FACTORY);
        let err = create_source_bin(&fw, 1, "file:///a.mp4").unwrap_err();
        assert_eq!(
            err,
            ConstructionError::Stage {
                factory: DECODER_FACTORY.into(),
                name: DECODER_NAME.into()
            }
        );
        assert_eq!(fw.stage_count(), 0);
    }

    #[test]
    fn test_low_latency_hint_reaches_nested_sources() {
        let fw = MemoryFramework::new();
        let source = create_source_bin(&fw, 0, "rtsp://camera/stream").unwrap();

        // Decoder spawns a nested decode bin, which then spawns the network source
        let nested = fw.add_child(source.decoder, "decodebin", "decodebin0").unwrap();
        let rtsp = fw.add_child(nested, "rtspsrc", "source").unwrap();
        let file = fw.add_child(nested, "filesrc", "file-source").unwrap();

        assert_eq!(fw.property(rtsp, LOW_LATENCY_PROPERTY), Some(true.into()));
        assert_eq!(fw.property(file, LOW_LATENCY_PROPERTY), None);
    }

    #[test]
    fn test_tree_walk_covers_existing_children() {
        let fw = MemoryFramework::new();
        let outer = fw.new_bin("outer").unwrap();
        let rtsp = fw.add_child(outer, "rtspsrc", "rtsp-source").unwrap();
        let other = fw.add_child(outer, "rtspsrc", "camera").unwrap();

        assert_eq!(apply_low_latency_hint(&fw, outer), 1);
        assert_eq!(fw.property(rtsp, LOW_LATENCY_PROPERTY), Some(true.into()));
        assert_eq!(fw.property(other, LOW_LATENCY_PROPERTY), None);
    }
}
