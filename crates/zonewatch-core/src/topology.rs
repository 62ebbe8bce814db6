//! Processing graph assembly.
//!
//! [`TopologyBuilder::build`] creates and links every stage in one call:
//!
//! ```text
//! source-bin-00 ─┐
//! source-bin-01 ─┼─▶ stream-muxer ─▶ primary-inference ─▶ convertor1 ─▶ filter1
//! source-bin-NN ─┘                                                        │
//!        ┌─────────────────────────────────────────────────────────────────┘
//!        ▼
//!     nvtiler ─▶ convertor2 ─▶ onscreendisplay ─▶ nvsink-tee ─┬─▶ nvtee-que1 ─▶ [nvegl-transform] ─▶ nvvideo-renderer
//!                                                  (probe)    └─▶ nvtee-que2 ─▶ nvmsg-converter ─▶ nvmsg-broker
//! ```
//!
//! Every created stage and link is mirrored in a [`Topology`] arena so the
//! assembled graph can be inspected and described without asking the
//! framework. A failed build disposes whatever was already created.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{
    AppConfig, BuildParams, StreamConfig, BATCHED_PUSH_TIMEOUT_US, MUXER_HEIGHT, MUXER_WIDTH,
};
use crate::error::ConstructionError;
use crate::framework::{
    HookSlot, MediaFramework, PipelineState, PortId, PropertyValue, StageId, StatusSignal,
};
use crate::lifecycle::MetadataLifecycleManager;
use crate::probe::ZoneViolationProbe;
use crate::source_bin::{create_source_bin, SourceBin, OUTPUT_PORT};
use crate::tracing::prefix;

/// Stage factory names
pub mod factory {
    pub const MUXER: &str = "nvstreammux";
    pub const INFERENCE: &str = "nvinfer";
    pub const CONVERTER: &str = "nvvideoconvert";
    pub const CAPS_FILTER: &str = "capsfilter";
    pub const TILER: &str = "nvmultistreamtiler";
    pub const OVERLAY: &str = "nvdsosd";
    pub const BRANCH: &str = "tee";
    pub const QUEUE: &str = "queue";
    pub const EGL_TRANSFORM: &str = "nvegltransform";
    pub const RENDER_SINK: &str = "nveglglessink";
    pub const MSG_CONVERTER: &str = "nvmsgconv";
    pub const MSG_BROKER: &str = "nvmsgbroker";
}

/// Stage names inside the pipeline
pub mod names {
    pub const PIPELINE: &str = "zonewatch-pipeline";
    pub const MUXER: &str = "stream-muxer";
    pub const INFERENCE: &str = "primary-inference";
    pub const CONVERTER_1: &str = "convertor1";
    pub const CAPS_FILTER: &str = "filter1";
    pub const TILER: &str = "nvtiler";
    pub const CONVERTER_2: &str = "convertor2";
    pub const OVERLAY: &str = "onscreendisplay";
    pub const BRANCH: &str = "nvsink-tee";
    pub const RENDER_QUEUE: &str = "nvtee-que1";
    pub const EXPORT_QUEUE: &str = "nvtee-que2";
    pub const EGL_TRANSFORM: &str = "nvegl-transform";
    pub const RENDER_SINK: &str = "nvvideo-renderer";
    pub const MSG_CONVERTER: &str = "nvmsg-converter";
    pub const MSG_BROKER: &str = "nvmsg-broker";
}

/// Caps forced between the first converter and the tiler
pub const RGBA_NVMM_CAPS: &str = "video/x-raw(memory:NVMM), format=RGBA";

const BRANCH_TEMPLATE: &str = "src_%u";

/// Tiler layout for the composited output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TilerGrid {
    pub rows: u32,
    pub columns: u32,
}

/// `rows = floor(sqrt(n))`, `columns = ceil(n / rows)`; at least 1×1.
pub fn tiler_grid(streams: u32) -> TilerGrid {
    let rows = isqrt(streams).max(1);
    TilerGrid {
        rows,
        columns: streams.div_ceil(rows).max(1),
    }
}

fn isqrt(n: u32) -> u32 {
    let n = u64::from(n);
    let mut root = (n as f64).sqrt() as u64;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root as u32
}

/// What a stage does in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageRole {
    Source,
    Muxer,
    Inference,
    Converter,
    CapsFilter,
    Tiler,
    Overlay,
    Branch,
    Queue,
    Transform,
    RenderSink,
    MessageConverter,
    MessageBroker,
}

/// A stage in the topology arena
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageNode {
    pub name: String,
    pub factory: String,
    pub role: StageRole,
    #[serde(skip)]
    pub stage: StageId,
}

/// A port-to-port link between two stages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub from_port: String,
    pub to_port: String,
}

/// Serializable view of a [`Topology`]
#[derive(Debug, Clone, Serialize)]
pub struct TopologyDescription {
    pub stages: Vec<StageNode>,
    pub links: Vec<LinkDescription>,
    pub grid: Option<TilerGrid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkDescription {
    pub from: String,
    pub from_port: String,
    pub to: String,
    pub to_port: String,
}

/// Index-addressed mirror of the assembled graph.
///
/// Stages refer to each other by arena index only; there are no
/// back-references from stages to their neighbours.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: DiGraph<StageNode, Edge>,
    by_name: HashMap<String, NodeIndex>,
    by_stage: HashMap<StageId, NodeIndex>,
    grid: Option<TilerGrid>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_stage(&mut self, node: StageNode) -> NodeIndex {
        let name = node.name.clone();
        let stage = node.stage;
        let idx = self.graph.add_node(node);
        self.by_name.insert(name, idx);
        self.by_stage.insert(stage, idx);
        idx
    }

    fn add_link(&mut self, from: StageId, to: StageId, edge: Edge) {
        if let (Some(&a), Some(&b)) = (self.by_stage.get(&from), self.by_stage.get(&to)) {
            self.graph.add_edge(a, b, edge);
        }
    }

    fn name_of(&self, stage: StageId) -> String {
        self.by_stage
            .get(&stage)
            .map(|idx| self.graph[*idx].name.clone())
            .unwrap_or_else(|| format!("{stage:?}"))
    }

    pub fn stage(&self, name: &str) -> Option<&StageNode> {
        self.by_name.get(name).map(|idx| &self.graph[*idx])
    }

    pub fn stage_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Stages in creation order
    pub fn stages(&self) -> impl Iterator<Item = &StageNode> {
        self.graph.node_weights()
    }

    pub fn stages_with_role(&self, role: StageRole) -> Vec<&StageNode> {
        self.stages().filter(|s| s.role == role).collect()
    }

    /// Names of stages fed by `name`, in link order
    pub fn downstream(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.by_name.get(name) else {
            return Vec::new();
        };
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .filter(|(from, _)| *from == idx)
            .map(|(_, to)| self.graph[to].name.as_str())
            .collect()
    }

    /// Names of stages feeding `name`, in link order
    pub fn upstream(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.by_name.get(name) else {
            return Vec::new();
        };
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .filter(|(_, to)| *to == idx)
            .map(|(from, _)| self.graph[from].name.as_str())
            .collect()
    }

    /// Follow single-output links from `name` until a branch or a sink.
    pub fn chain_from(&self, name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut cursor = self.stage(name).map(|s| s.name.as_str());
        while let Some(current) = cursor {
            chain.push(current);
            let next = self.downstream(current);
            cursor = match next.as_slice() {
                [only] => Some(*only),
                _ => None,
            };
        }
        chain
    }

    /// Stages with more than one output link
    pub fn branch_points(&self) -> Vec<&str> {
        self.stages()
            .map(|s| s.name.as_str())
            .filter(|name| self.downstream(name).len() > 1)
            .collect()
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    pub fn grid(&self) -> Option<TilerGrid> {
        self.grid
    }

    pub fn describe(&self) -> TopologyDescription {
        let links = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.graph.edge_endpoints(e)?;
                let edge = &self.graph[e];
                Some(LinkDescription {
                    from: self.graph[from].name.clone(),
                    from_port: edge.from_port.clone(),
                    to: self.graph[to].name.clone(),
                    to_port: edge.to_port.clone(),
                })
            })
            .collect();

        TopologyDescription {
            stages: self.stages().cloned().collect(),
            links,
            grid: self.grid,
        }
    }
}

/// An assembled graph, ready to be driven by the controller.
///
/// Dropping the handle forces the pipeline to its null state and disposes
/// it.
pub struct GraphHandle {
    pub(crate) framework: Arc<dyn MediaFramework>,
    pub(crate) pipeline: StageId,
    pub(crate) topology: Topology,
    pub(crate) sources: Vec<SourceBin>,
    pub(crate) bus: Receiver<StatusSignal>,
    pub(crate) hooks: Option<HookSlot>,
    pub(crate) lifecycle: Arc<MetadataLifecycleManager>,
    pub(crate) probe: Arc<ZoneViolationProbe>,
    pub(crate) probe_port: PortId,
    pub(crate) configs: Arc<[StreamConfig]>,
}

impl GraphHandle {
    pub fn pipeline(&self) -> StageId {
        self.pipeline
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn sources(&self) -> &[SourceBin] {
        &self.sources
    }

    pub fn configs(&self) -> &[StreamConfig] {
        &self.configs
    }

    pub fn lifecycle(&self) -> &Arc<MetadataLifecycleManager> {
        &self.lifecycle
    }

    pub fn probe(&self) -> &Arc<ZoneViolationProbe> {
        &self.probe
    }

    /// Port the zone probe is attached to
    pub fn probe_port(&self) -> PortId {
        self.probe_port
    }

    pub fn hooks_installed(&self) -> bool {
        self.hooks.is_some()
    }
}

impl fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphHandle")
            .field("pipeline", &self.pipeline)
            .field("stages", &self.topology.stage_count())
            .field("links", &self.topology.link_count())
            .field("sources", &self.sources.len())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Drop for GraphHandle {
    fn drop(&mut self) {
        if let Some(slot) = self.hooks.take() {
            self.framework.remove_lifecycle_hooks(slot);
        }
        if let Err(e) = self.framework.set_state(self.pipeline, PipelineState::Null) {
            debug!(error = %e, "null state on drop failed");
        }
        self.framework.dispose(self.pipeline);
    }
}

/// Disposes a partially built pipeline unless disarmed.
struct PipelineGuard<'a> {
    framework: &'a dyn MediaFramework,
    pipeline: Option<StageId>,
}

impl<'a> PipelineGuard<'a> {
    fn new(framework: &'a dyn MediaFramework, pipeline: StageId) -> Self {
        Self {
            framework,
            pipeline: Some(pipeline),
        }
    }

    fn disarm(mut self) {
        self.pipeline = None;
    }
}

impl Drop for PipelineGuard<'_> {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            warn!("disposing partially built pipeline");
            self.framework.dispose(pipeline);
        }
    }
}

/// Stage creation and linking against one pipeline, mirrored into a
/// [`Topology`].
struct Assembly<'a> {
    fw: &'a dyn MediaFramework,
    pipeline: StageId,
    topology: Topology,
}

impl Assembly<'_> {
    fn stage(
        &mut self,
        factory: &str,
        name: &str,
        role: StageRole,
    ) -> Result<StageId, ConstructionError> {
        debug!(factory, name, "creating stage");
        let stage = self
            .fw
            .make_stage(factory, name)
            .map_err(|_| ConstructionError::Stage {
                factory: factory.to_string(),
                name: name.to_string(),
            })?;
        self.adopt(stage, factory, name, role)?;
        Ok(stage)
    }

    fn adopt(
        &mut self,
        stage: StageId,
        factory: &str,
        name: &str,
        role: StageRole,
    ) -> Result<(), ConstructionError> {
        self.fw
            .add(self.pipeline, stage)
            .map_err(|e| ConstructionError::Registration(e.to_string()))?;
        self.topology.add_stage(StageNode {
            name: name.to_string(),
            factory: factory.to_string(),
            role,
            stage,
        });
        Ok(())
    }

    fn set(
        &self,
        stage: StageId,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), ConstructionError> {
        self.fw
            .set_property(stage, key, value.into())
            .map_err(|_| ConstructionError::Property {
                stage: self.topology.name_of(stage),
                key: key.to_string(),
            })
    }

    fn link(&mut self, upstream: StageId, downstream: StageId) -> Result<(), ConstructionError> {
        self.fw
            .link(upstream, downstream)
            .map_err(|_| self.link_error(upstream, downstream))?;
        self.topology.add_link(
            upstream,
            downstream,
            Edge {
                from_port: "src".to_string(),
                to_port: "sink".to_string(),
            },
        );
        Ok(())
    }

    fn link_chain(&mut self, stages: &[StageId]) -> Result<(), ConstructionError> {
        for pair in stages.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    fn link_ports(
        &mut self,
        (upstream, src_port, src_name): (StageId, PortId, &str),
        (downstream, sink_port, sink_name): (StageId, PortId, &str),
    ) -> Result<(), ConstructionError> {
        self.fw
            .link_ports(src_port, sink_port)
            .map_err(|_| self.link_error(upstream, downstream))?;
        self.topology.add_link(
            upstream,
            downstream,
            Edge {
                from_port: src_name.to_string(),
                to_port: sink_name.to_string(),
            },
        );
        Ok(())
    }

    fn link_error(&self, upstream: StageId, downstream: StageId) -> ConstructionError {
        ConstructionError::Link {
            from: self.topology.name_of(upstream),
            to: self.topology.name_of(downstream),
        }
    }

    fn static_port(&self, stage: StageId, port: &str) -> Result<PortId, ConstructionError> {
        self.fw
            .static_port(stage, port)
            .ok_or_else(|| self.port_error(stage, port))
    }

    fn request_port(&self, stage: StageId, template: &str) -> Result<PortId, ConstructionError> {
        self.fw
            .request_port(stage, template)
            .ok_or_else(|| self.port_error(stage, template))
    }

    fn port_error(&self, stage: StageId, port: &str) -> ConstructionError {
        ConstructionError::Port {
            stage: self.topology.name_of(stage),
            port: port.to_string(),
        }
    }

    /// Request a branch port and link it to `queue`'s input.
    fn branch_to(&mut self, tee: StageId, queue: StageId) -> Result<(), ConstructionError> {
        let src = self.request_port(tee, BRANCH_TEMPLATE)?;
        let src_name = self
            .fw
            .port_name(src)
            .unwrap_or_else(|| BRANCH_TEMPLATE.to_string());
        let sink = self.static_port(queue, "sink")?;
        self.link_ports((tee, src, src_name.as_str()), (queue, sink, "sink"))
    }
}

/// Builds the processing graph for a set of streams.
pub struct TopologyBuilder {
    framework: Arc<dyn MediaFramework>,
    params: BuildParams,
    pipeline_name: String,
}

impl TopologyBuilder {
    pub fn new(framework: Arc<dyn MediaFramework>, params: BuildParams) -> Self {
        Self {
            framework,
            params,
            pipeline_name: names::PIPELINE.to_string(),
        }
    }

    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Assemble the full graph. Never retries; on error nothing built so far
    /// stays registered with the framework.
    pub fn build(self, configs: Vec<StreamConfig>) -> Result<GraphHandle, ConstructionError> {
        let configs = AppConfig::new(configs)
            .map_err(|e| ConstructionError::Config(e.to_string()))?
            .streams;
        let stream_count = configs.len() as u32;
        let params = &self.params;
        let fw = self.framework.as_ref();

        info!(
            "{} Building pipeline for {} stream(s)",
            prefix::BUILD,
            stream_count
        );

        let pipeline = fw
            .new_pipeline(&self.pipeline_name)
            .map_err(|_| ConstructionError::Pipeline(self.pipeline_name.clone()))?;
        let guard = PipelineGuard::new(fw, pipeline);

        let mut asm = Assembly {
            fw,
            pipeline,
            topology: Topology::new(),
        };

        // Sources into the batcher
        let muxer = asm.stage(factory::MUXER, names::MUXER, StageRole::Muxer)?;
        let mut sources = Vec::with_capacity(configs.len());
        for (index, config) in (0u32..).zip(&configs) {
            info!(index, uri = %config.uri, "creating source");
            let source = create_source_bin(fw, index, &config.uri)?;
            if let Err(e) = asm.adopt(source.bin, "bin", &source.name, StageRole::Source) {
                fw.dispose(source.bin);
                return Err(e);
            }

            let sink_name = format!("sink_{index}");
            let sink = asm.request_port(muxer, &sink_name)?;
            let src = asm.static_port(source.bin, OUTPUT_PORT)?;
            asm.link_ports(
                (source.bin, src, OUTPUT_PORT),
                (muxer, sink, sink_name.as_str()),
            )?;
            sources.push(source);
        }

        if configs.iter().any(StreamConfig::is_live) {
            debug!("live source present");
            asm.set(muxer, "live-source", true)?;
        }
        asm.set(muxer, "width", MUXER_WIDTH)?;
        asm.set(muxer, "height", MUXER_HEIGHT)?;
        asm.set(muxer, "batch-size", stream_count)?;
        asm.set(muxer, "batched-push-timeout", BATCHED_PUSH_TIMEOUT_US)?;

        // Inference and compositing chain
        let inference = asm.stage(factory::INFERENCE, names::INFERENCE, StageRole::Inference)?;
        asm.set(inference, "config-file-path", params.model_config_path.as_str())?;
        let configured = fw.property(inference, "batch-size").and_then(|v| v.as_u64());
        if configured != Some(u64::from(stream_count)) {
            if let Some(configured) = configured {
                warn!(
                    "Overriding inference batch size {} with number of sources {}",
                    configured, stream_count
                );
            }
            asm.set(inference, "batch-size", stream_count)?;
        }

        let converter_1 = asm.stage(factory::CONVERTER, names::CONVERTER_1, StageRole::Converter)?;
        let caps_filter = asm.stage(
            factory::CAPS_FILTER,
            names::CAPS_FILTER,
            StageRole::CapsFilter,
        )?;
        asm.set(caps_filter, "caps", RGBA_NVMM_CAPS)?;

        let tiler = asm.stage(factory::TILER, names::TILER, StageRole::Tiler)?;
        let grid = tiler_grid(stream_count);
        asm.set(tiler, "rows", grid.rows)?;
        asm.set(tiler, "columns", grid.columns)?;
        asm.set(tiler, "width", params.tiled_width)?;
        asm.set(tiler, "height", params.tiled_height)?;
        asm.topology.grid = Some(grid);

        let converter_2 = asm.stage(factory::CONVERTER, names::CONVERTER_2, StageRole::Converter)?;
        let overlay = asm.stage(factory::OVERLAY, names::OVERLAY, StageRole::Overlay)?;
        let tee = asm.stage(factory::BRANCH, names::BRANCH, StageRole::Branch)?;

        asm.link_chain(&[
            muxer,
            inference,
            converter_1,
            caps_filter,
            tiler,
            converter_2,
            overlay,
            tee,
        ])?;

        // Render path
        let render_queue = asm.stage(factory::QUEUE, names::RENDER_QUEUE, StageRole::Queue)?;
        let transform = if params.platform.needs_egl_transform() {
            Some(asm.stage(
                factory::EGL_TRANSFORM,
                names::EGL_TRANSFORM,
                StageRole::Transform,
            )?)
        } else {
            None
        };
        let render_sink = asm.stage(
            factory::RENDER_SINK,
            names::RENDER_SINK,
            StageRole::RenderSink,
        )?;
        asm.set(render_sink, "sync", false)?;
        asm.set(render_sink, "qos", false)?;

        // Export path
        let export_queue = asm.stage(factory::QUEUE, names::EXPORT_QUEUE, StageRole::Queue)?;
        let msg_converter = asm.stage(
            factory::MSG_CONVERTER,
            names::MSG_CONVERTER,
            StageRole::MessageConverter,
        )?;
        asm.set(msg_converter, "payload-type", params.payload_type)?;
        if let Some(config) = &params.msgconv_config {
            asm.set(msg_converter, "config", config.as_str())?;
        }
        let msg_broker = asm.stage(
            factory::MSG_BROKER,
            names::MSG_BROKER,
            StageRole::MessageBroker,
        )?;
        asm.set(msg_broker, "proto-lib", params.proto_lib.as_str())?;
        asm.set(msg_broker, "conn-str", params.conn_str.as_str())?;
        if let Some(topic) = &params.topic {
            asm.set(msg_broker, "topic", topic.as_str())?;
        }
        asm.set(msg_broker, "sync", false)?;

        asm.branch_to(tee, render_queue)?;
        match transform {
            Some(transform) => asm.link_chain(&[render_queue, transform, render_sink])?,
            None => asm.link(render_queue, render_sink)?,
        }
        asm.branch_to(tee, export_queue)?;
        asm.link_chain(&[export_queue, msg_converter, msg_broker])?;

        // Zone checks run where both branches still see the same batch
        let configs: Arc<[StreamConfig]> = configs.into();
        let lifecycle = Arc::new(MetadataLifecycleManager::new());
        let probe = Arc::new(ZoneViolationProbe::new(
            Arc::clone(&configs),
            Arc::clone(&lifecycle),
            params.probe_budget,
        ));
        let probe_port = asm.static_port(tee, "sink")?;
        fw.add_buffer_probe(probe_port, probe.clone())
            .map_err(|e| ConstructionError::Registration(e.to_string()))?;

        let bus = fw
            .status_bus(pipeline)
            .map_err(|e| ConstructionError::Registration(e.to_string()))?;
        let hooks = fw
            .install_lifecycle_hooks(pipeline, lifecycle.hooks())
            .map_err(|e| ConstructionError::Registration(e.to_string()))?;

        guard.disarm();
        let topology = asm.topology;
        info!(
            stages = topology.stage_count(),
            links = topology.link_count(),
            rows = grid.rows,
            columns = grid.columns,
            "{} Pipeline built",
            prefix::BUILD
        );

        Ok(GraphHandle {
            framework: Arc::clone(&self.framework),
            pipeline,
            topology,
            sources,
            bus,
            hooks: Some(hooks),
            lifecycle,
            probe,
            probe_port,
            configs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiler_grid() {
        let cases = [
            (1, (1, 1)),
            (2, (1, 2)),
            (3, (1, 3)),
            (4, (2, 2)),
            (5, (2, 3)),
            (9, (3, 3)),
            (10, (3, 4)),
        ];
        for (n, (rows, columns)) in cases {
            assert_eq!(tiler_grid(n), TilerGrid { rows, columns }, "n = {n}");
        }
    }

    #[test]
    fn test_isqrt_near_squares() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(u32::MAX), 65_535);
    }

    #[test]
    fn test_topology_queries() {
        let mut topology = Topology::new();
        let node = |name: &str, id| StageNode {
            name: name.to_string(),
            factory: "queue".to_string(),
            role: StageRole::Queue,
            stage: StageId(id),
        };
        let edge = || Edge {
            from_port: "src".into(),
            to_port: "sink".into(),
        };
        for (name, id) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            topology.add_stage(node(name, id));
        }
        topology.add_link(StageId(1), StageId(2), edge());
        topology.add_link(StageId(2), StageId(3), edge());
        topology.add_link(StageId(2), StageId(4), edge());

        assert_eq!(topology.chain_from("a"), vec!["a", "b"]);
        assert_eq!(topology.downstream("b"), vec!["c", "d"]);
        assert_eq!(topology.upstream("c"), vec!["b"]);
        assert_eq!(topology.branch_points(), vec!["b"]);
        assert!(topology.is_acyclic());
        assert_eq!(topology.describe().links.len(), 3);
    }
}
