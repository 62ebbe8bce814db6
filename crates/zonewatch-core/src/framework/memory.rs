//! In-memory media framework
//!
//! Records stages, ports, links, properties and registrations without
//! moving any media. Useful for:
//! - Unit and integration testing of graph assembly and control flow
//! - Dry runs that print the assembled topology
//!
//! Tests drive it like a real framework would: [`MemoryFramework::emit_pad_added`]
//! plays the decoder negotiating its output, [`MemoryFramework::add_child`]
//! plays a decoder spawning nested elements, [`MemoryFramework::push_batch`]
//! sends a batch through a port's probes and across the branch, and
//! [`MemoryFramework::post`] puts a signal on a pipeline's status channel.
//!
//! Port layout follows the stages zonewatch uses: muxers expose request
//! `sink_N` ports, tees expose request `src_N` ports, sinks have no output,
//! and decode bins only grow ports at runtime.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{
    BufferProbe, DescendantAddedCallback, HookSlot, MediaFramework, NegotiatedCaps, NewPad,
    PadAddedCallback, PipelineState, PortId, ProbeId, ProbeReturn, PropertyValue, StageId,
    StatusMessage, StatusSignal,
};
use crate::error::{ConstructionError, FrameworkError};
use crate::lifecycle::{EventRecord, LifecycleHooks};
use crate::types::BatchRecord;

const PIPELINE_FACTORY: &str = "pipeline";
const BIN_FACTORY: &str = "bin";

/// Factories whose stages are containers that grow children at runtime
const CONTAINER_FACTORIES: &[&str] = &["uridecodebin", "decodebin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageKind {
    Pipeline,
    Bin,
    Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Src,
    Sink,
}

struct StageEntry {
    name: String,
    factory: String,
    kind: StageKind,
    parent: Option<StageId>,
    children: Vec<StageId>,
    properties: BTreeMap<String, PropertyValue>,
    next_request: u32,
    pad_added: Vec<Arc<PadAddedCallback>>,
    descendant_added: Vec<Arc<DescendantAddedCallback>>,
}

struct PortEntry {
    stage: StageId,
    name: String,
    direction: Direction,
    ghost: bool,
    target: Option<PortId>,
    peer: Option<PortId>,
    probes: Vec<Arc<dyn BufferProbe>>,
}

struct PipelineEntry {
    state: PipelineState,
    sender: Sender<StatusSignal>,
    receiver: Receiver<StatusSignal>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    stages: HashMap<StageId, StageEntry>,
    ports: HashMap<PortId, PortEntry>,
    links: Vec<(StageId, StageId)>,
    pipelines: HashMap<StageId, PipelineEntry>,
    hooks: HashMap<HookSlot, (StageId, LifecycleHooks)>,
    failing_factories: HashSet<String>,
    refused_requests: HashSet<String>,
    refused_adds: HashSet<String>,
    fail_state_changes: bool,
    schemas: HashMap<String, HashSet<String>>,
    defaults: HashMap<String, Vec<(String, PropertyValue)>>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn stage(&self, id: StageId) -> Result<&StageEntry, FrameworkError> {
        self.stages.get(&id).ok_or(FrameworkError::UnknownStage(id))
    }

    fn insert_stage(&mut self, factory: &str, name: &str, kind: StageKind) -> StageId {
        let id = StageId(self.next_id());
        let properties = self
            .defaults
            .get(factory)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        self.stages.insert(
            id,
            StageEntry {
                name: name.to_string(),
                factory: factory.to_string(),
                kind,
                parent: None,
                children: Vec::new(),
                properties,
                next_request: 0,
                pad_added: Vec::new(),
                descendant_added: Vec::new(),
            },
        );
        if kind != StageKind::Pipeline {
            for &(port, direction) in static_ports(factory) {
                self.insert_port(id, port, direction, false);
            }
        }
        id
    }

    fn insert_port(
        &mut self,
        stage: StageId,
        name: &str,
        direction: Direction,
        ghost: bool,
    ) -> PortId {
        let id = PortId(self.next_id());
        self.ports.insert(
            id,
            PortEntry {
                stage,
                name: name.to_string(),
                direction,
                ghost,
                target: None,
                peer: None,
                probes: Vec::new(),
            },
        );
        id
    }

    fn find_port(&self, stage: StageId, name: &str) -> Option<PortId> {
        self.ports
            .iter()
            .filter(|(_, p)| p.stage == stage && p.name == name)
            .map(|(id, _)| *id)
            .min()
    }

    /// The stage itself followed by its ancestors
    fn lineage(&self, stage: StageId) -> Vec<StageId> {
        let mut out = Vec::new();
        let mut cursor = Some(stage);
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.stages.get(&id).and_then(|s| s.parent);
        }
        out
    }

    fn root_pipeline(&self, stage: StageId) -> Option<StageId> {
        self.lineage(stage)
            .into_iter()
            .find(|id| self.pipelines.contains_key(id))
    }

    fn descendants(&self, root: StageId) -> Vec<StageId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(stage) = self.stages.get(&id) {
                stack.extend(stage.children.iter().copied());
                out.push(id);
            }
        }
        out
    }
}

fn static_ports(factory: &str) -> &'static [(&'static str, Direction)] {
    match factory {
        BIN_FACTORY | "uridecodebin" | "decodebin" => &[],
        "nvstreammux" => &[("src", Direction::Src)],
        "tee" => &[("sink", Direction::Sink)],
        "nveglglessink" | "nvmsgbroker" | "fakesink" => &[("sink", Direction::Sink)],
        _ => &[("sink", Direction::Sink), ("src", Direction::Src)],
    }
}

fn request_template(factory: &str) -> Option<(&'static str, Direction)> {
    match factory {
        "nvstreammux" => Some(("sink_", Direction::Sink)),
        "tee" => Some(("src_", Direction::Src)),
        _ => None,
    }
}

/// Result of pushing a batch through a probed port
#[derive(Debug, Default)]
pub struct BatchDelivery {
    /// False when a probe dropped the batch
    pub passed: bool,
    /// Event records copied across the branch into the export path
    pub exported: Vec<EventRecord>,
}

/// In-process [`MediaFramework`] implementation.
pub struct MemoryFramework {
    inner: Mutex<Inner>,
}

impl Default for MemoryFramework {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryFramework")
            .field("stages", &inner.stages.len())
            .field("ports", &inner.ports.len())
            .field("pipelines", &inner.pipelines.len())
            .finish()
    }
}

impl MemoryFramework {
    /// Create a framework with the property layout of common source
    /// elements and an inference stage defaulting to batch size 1.
    pub fn new() -> Self {
        let framework = Self {
            inner: Mutex::new(Inner::default()),
        };
        framework.declare_properties("rtspsrc", &["location", "latency", "drop-on-latency"]);
        framework.declare_properties("filesrc", &["location"]);
        framework.set_default_property("nvinfer", "batch-size", PropertyValue::UInt(1));
        framework
    }

    // === Fault injection ===

    /// Make every later stage creation from `factory` fail.
    ///
    /// `"pipeline"` and `"bin"` target container creation.
    pub fn fail_factory(&self, factory: &str) {
        self.inner.lock().failing_factories.insert(factory.to_string());
    }

    /// Make request-port calls on stages from `factory` return nothing.
    pub fn refuse_requests(&self, factory: &str) {
        self.inner.lock().refused_requests.insert(factory.to_string());
    }

    /// Make adding stages from `factory` to a bin fail.
    pub fn refuse_adds(&self, factory: &str) {
        self.inner.lock().refused_adds.insert(factory.to_string());
    }

    /// Make transitions to any non-null state fail.
    pub fn fail_state_changes(&self) {
        self.inner.lock().fail_state_changes = true;
    }

    /// Restrict stages from `factory` to the given properties.
    pub fn declare_properties(&self, factory: &str, keys: &[&str]) {
        self.inner
            .lock()
            .schemas
            .insert(factory.to_string(), keys.iter().map(|k| k.to_string()).collect());
    }

    /// Preset a property on every later stage created from `factory`.
    pub fn set_default_property(&self, factory: &str, key: &str, value: PropertyValue) {
        self.inner
            .lock()
            .defaults
            .entry(factory.to_string())
            .or_default()
            .push((key.to_string(), value));
    }

    // === Inspection ===

    /// Number of live stages, containers included.
    pub fn stage_count(&self) -> usize {
        self.inner.lock().stages.len()
    }

    pub fn parent_of(&self, stage: StageId) -> Option<StageId> {
        self.inner.lock().stages.get(&stage).and_then(|s| s.parent)
    }

    pub fn pipeline_state(&self, pipeline: StageId) -> Option<PipelineState> {
        self.inner.lock().pipelines.get(&pipeline).map(|p| p.state)
    }

    /// Number of installed lifecycle hook pairs across all pipelines.
    pub fn installed_hooks(&self) -> usize {
        self.inner.lock().hooks.len()
    }

    pub fn probe_count(&self, port: PortId) -> usize {
        self.inner.lock().ports.get(&port).map_or(0, |p| p.probes.len())
    }

    pub fn peer(&self, port: PortId) -> Option<PortId> {
        self.inner.lock().ports.get(&port).and_then(|p| p.peer)
    }

    pub fn ghost_target(&self, port: PortId) -> Option<PortId> {
        self.inner.lock().ports.get(&port).and_then(|p| p.target)
    }

    /// Stage-level links in creation order.
    pub fn links(&self) -> Vec<(StageId, StageId)> {
        self.inner.lock().links.clone()
    }

    // === Drivers ===

    /// Play a decoder creating an output port with the given caps.
    ///
    /// Runs every pad-added callback on `decoder`. A failing callback posts
    /// an error on the owning pipeline's status channel and its error is
    /// returned.
    pub fn emit_pad_added(
        &self,
        decoder: StageId,
        caps: NegotiatedCaps,
    ) -> Result<PortId, ConstructionError> {
        let (pad, callbacks, origin, bus) = {
            let mut inner = self.inner.lock();
            let stage = inner
                .stage(decoder)
                .map_err(|e| ConstructionError::Registration(e.to_string()))?;
            let origin = stage.name.clone();
            let callbacks = stage.pad_added.clone();
            let index = inner.ports.values().filter(|p| p.stage == decoder).count();
            let port = inner.insert_port(decoder, &format!("src_{index}"), Direction::Src, false);
            let bus = inner
                .root_pipeline(decoder)
                .and_then(|p| inner.pipelines.get(&p))
                .map(|p| p.sender.clone());
            (
                NewPad {
                    stage: decoder,
                    port,
                    caps,
                },
                callbacks,
                origin,
                bus,
            )
        };

        trace!(decoder = %origin, caps = %pad.caps, "pad added");
        for callback in &callbacks {
            if let Err(e) = (**callback)(self, &pad) {
                let posted = bus.as_ref().is_some_and(|bus| {
                    bus.send(StatusSignal::Error(StatusMessage::new(
                        origin.clone(),
                        e.to_string(),
                    )))
                    .is_ok()
                });
                if !posted {
                    debug!(decoder = %origin, error = %e, "binding failure not posted");
                }
                return Err(e);
            }
        }
        Ok(pad.port)
    }

    /// Play a bin spawning a nested element at runtime.
    pub fn add_child(
        &self,
        bin: StageId,
        factory: &str,
        name: &str,
    ) -> Result<StageId, FrameworkError> {
        let child = self.make_stage(factory, name)?;
        self.add(bin, child)?;
        Ok(child)
    }

    /// Send a batch through `port`: run its probes, then copy attached
    /// event records across the branch with the pipeline's lifecycle hooks
    /// and release the originals.
    pub fn push_batch(&self, port: PortId, batch: &mut BatchRecord) -> BatchDelivery {
        let (probes, hooks) = {
            let inner = self.inner.lock();
            let Some(entry) = inner.ports.get(&port) else {
                return BatchDelivery::default();
            };
            let pipeline = inner.root_pipeline(entry.stage);
            let hooks = inner
                .hooks
                .values()
                .find(|(owner, _)| Some(*owner) == pipeline)
                .map(|(_, hooks)| hooks.clone());
            (entry.probes.clone(), hooks)
        };

        for probe in &probes {
            if probe.on_buffer(batch) == ProbeReturn::Drop {
                return BatchDelivery::default();
            }
        }

        let mut exported = Vec::new();
        if let Some(hooks) = hooks {
            for frame in &mut batch.frames {
                for event in &mut frame.events {
                    exported.push((hooks.duplicate)(event));
                    (hooks.release)(event);
                }
            }
        }

        BatchDelivery {
            passed: true,
            exported,
        }
    }

    /// Put a signal on a pipeline's status channel.
    pub fn post(&self, pipeline: StageId, signal: StatusSignal) -> bool {
        let sender = self
            .inner
            .lock()
            .pipelines
            .get(&pipeline)
            .map(|p| p.sender.clone());
        sender.is_some_and(|s| s.send(signal).is_ok())
    }

    fn make_container(
        &self,
        factory: &str,
        name: &str,
        kind: StageKind,
    ) -> Result<StageId, FrameworkError> {
        let mut inner = self.inner.lock();
        if inner.failing_factories.contains(factory) {
            return Err(FrameworkError::FactoryUnavailable(factory.to_string()));
        }
        let id = inner.insert_stage(factory, name, kind);
        if kind == StageKind::Pipeline {
            let (sender, receiver) = unbounded();
            inner.pipelines.insert(
                id,
                PipelineEntry {
                    state: PipelineState::Null,
                    sender,
                    receiver,
                },
            );
        }
        Ok(id)
    }
}

impl MediaFramework for MemoryFramework {
    fn new_pipeline(&self, name: &str) -> Result<StageId, FrameworkError> {
        self.make_container(PIPELINE_FACTORY, name, StageKind::Pipeline)
    }

    fn new_bin(&self, name: &str) -> Result<StageId, FrameworkError> {
        self.make_container(BIN_FACTORY, name, StageKind::Bin)
    }

    fn make_stage(&self, factory: &str, name: &str) -> Result<StageId, FrameworkError> {
        let mut inner = self.inner.lock();
        if inner.failing_factories.contains(factory) {
            return Err(FrameworkError::FactoryUnavailable(factory.to_string()));
        }
        let kind = if CONTAINER_FACTORIES.contains(&factory) {
            StageKind::Bin
        } else {
            StageKind::Element
        };
        Ok(inner.insert_stage(factory, name, kind))
    }

    fn add(&self, bin: StageId, child: StageId) -> Result<(), FrameworkError> {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.stage(bin)?.kind == StageKind::Element {
                return Err(FrameworkError::NotABin(bin));
            }
            let refused = inner.refused_adds.contains(&inner.stage(child)?.factory);
            let entry = inner
                .stages
                .get_mut(&child)
                .ok_or(FrameworkError::UnknownStage(child))?;
            if refused {
                return Err(FrameworkError::AddRefused(entry.name.clone()));
            }
            entry.parent = Some(bin);
            if let Some(parent) = inner.stages.get_mut(&bin) {
                parent.children.push(child);
            }
            let callbacks: Vec<_> = inner
                .lineage(bin)
                .iter()
                .filter_map(|id| inner.stages.get(id))
                .flat_map(|s| s.descendant_added.iter().cloned())
                .collect();
            callbacks
        };

        for callback in &callbacks {
            (**callback)(self, child);
        }
        Ok(())
    }

    fn children(&self, bin: StageId) -> Vec<StageId> {
        self.inner
            .lock()
            .stages
            .get(&bin)
            .map(|s| s.children.clone())
            .unwrap_or_default()
    }

    fn stage_name(&self, stage: StageId) -> Option<String> {
        self.inner.lock().stages.get(&stage).map(|s| s.name.clone())
    }

    fn has_property(&self, stage: StageId, key: &str) -> bool {
        let inner = self.inner.lock();
        match inner.stages.get(&stage) {
            Some(entry) => match inner.schemas.get(&entry.factory) {
                Some(keys) => keys.contains(key),
                None => entry.properties.contains_key(key),
            },
            None => false,
        }
    }

    fn set_property(
        &self,
        stage: StageId,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), FrameworkError> {
        let mut inner = self.inner.lock();
        let factory = inner.stage(stage)?.factory.clone();
        if inner
            .schemas
            .get(&factory)
            .is_some_and(|keys| !keys.contains(key))
        {
            return Err(FrameworkError::PropertyUnsupported {
                stage,
                key: key.to_string(),
            });
        }
        if let Some(entry) = inner.stages.get_mut(&stage) {
            entry.properties.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn property(&self, stage: StageId, key: &str) -> Option<PropertyValue> {
        self.inner
            .lock()
            .stages
            .get(&stage)
            .and_then(|s| s.properties.get(key).cloned())
    }

    fn static_port(&self, stage: StageId, name: &str) -> Option<PortId> {
        self.inner.lock().find_port(stage, name)
    }

    fn port_name(&self, port: PortId) -> Option<String> {
        self.inner.lock().ports.get(&port).map(|p| p.name.clone())
    }

    fn request_port(&self, stage: StageId, template: &str) -> Option<PortId> {
        let mut inner = self.inner.lock();
        let entry = inner.stages.get(&stage)?;
        if inner.refused_requests.contains(&entry.factory) {
            return None;
        }
        let (prefix, direction) = request_template(&entry.factory)?;
        let suffix = template.strip_prefix(prefix)?;

        let name = if suffix == "%u" {
            let entry = inner.stages.get_mut(&stage)?;
            let index = entry.next_request;
            entry.next_request += 1;
            format!("{prefix}{index}")
        } else {
            suffix.parse::<u32>().ok()?;
            if inner.find_port(stage, template).is_some() {
                return None;
            }
            template.to_string()
        };
        Some(inner.insert_port(stage, &name, direction, false))
    }

    fn add_ghost_port(&self, bin: StageId, name: &str) -> Result<PortId, FrameworkError> {
        let mut inner = self.inner.lock();
        if inner.stage(bin)?.kind == StageKind::Element {
            return Err(FrameworkError::NotABin(bin));
        }
        Ok(inner.insert_port(bin, name, Direction::Src, true))
    }

    fn set_ghost_target(&self, ghost: PortId, target: PortId) -> Result<(), FrameworkError> {
        let mut inner = self.inner.lock();
        match inner.ports.get(&target) {
            Some(port) if port.direction == Direction::Src => {}
            Some(_) => {
                return Err(FrameworkError::LinkRefused(
                    "ghost target must be an output port".to_string(),
                ))
            }
            None => return Err(FrameworkError::UnknownPort(target)),
        }
        let port = inner
            .ports
            .get_mut(&ghost)
            .ok_or(FrameworkError::UnknownPort(ghost))?;
        if !port.ghost {
            return Err(FrameworkError::LinkRefused(format!(
                "port '{}' is not a ghost port",
                port.name
            )));
        }
        port.target = Some(target);
        Ok(())
    }

    fn link_ports(&self, src: PortId, sink: PortId) -> Result<(), FrameworkError> {
        let mut inner = self.inner.lock();
        let src_entry = inner.ports.get(&src).ok_or(FrameworkError::UnknownPort(src))?;
        let sink_entry = inner.ports.get(&sink).ok_or(FrameworkError::UnknownPort(sink))?;

        if src_entry.direction != Direction::Src || sink_entry.direction != Direction::Sink {
            return Err(FrameworkError::LinkRefused(format!(
                "'{}' -> '{}' has mismatched directions",
                src_entry.name, sink_entry.name
            )));
        }
        if src_entry.peer.is_some() || sink_entry.peer.is_some() {
            return Err(FrameworkError::LinkRefused(format!(
                "'{}' -> '{}' is already linked",
                src_entry.name, sink_entry.name
            )));
        }

        let pair = (src_entry.stage, sink_entry.stage);
        if let Some(p) = inner.ports.get_mut(&src) {
            p.peer = Some(sink);
        }
        if let Some(p) = inner.ports.get_mut(&sink) {
            p.peer = Some(src);
        }
        inner.links.push(pair);
        Ok(())
    }

    fn link(&self, upstream: StageId, downstream: StageId) -> Result<(), FrameworkError> {
        let (src, sink) = {
            let inner = self.inner.lock();
            let src = inner.find_port(upstream, "src").ok_or_else(|| {
                FrameworkError::LinkRefused(format!("{upstream:?} has no output port"))
            })?;
            let sink = inner.find_port(downstream, "sink").ok_or_else(|| {
                FrameworkError::LinkRefused(format!("{downstream:?} has no input port"))
            })?;
            (src, sink)
        };
        self.link_ports(src, sink)
    }

    fn connect_pad_added(
        &self,
        stage: StageId,
        callback: PadAddedCallback,
    ) -> Result<(), FrameworkError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .stages
            .get_mut(&stage)
            .ok_or(FrameworkError::UnknownStage(stage))?;
        entry.pad_added.push(Arc::new(callback));
        Ok(())
    }

    fn connect_descendant_added(
        &self,
        bin: StageId,
        callback: DescendantAddedCallback,
    ) -> Result<(), FrameworkError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .stages
            .get_mut(&bin)
            .ok_or(FrameworkError::UnknownStage(bin))?;
        entry.descendant_added.push(Arc::new(callback));
        Ok(())
    }

    fn add_buffer_probe(
        &self,
        port: PortId,
        probe: Arc<dyn BufferProbe>,
    ) -> Result<ProbeId, FrameworkError> {
        let mut inner = self.inner.lock();
        let id = ProbeId(inner.next_id());
        inner
            .ports
            .get_mut(&port)
            .ok_or(FrameworkError::UnknownPort(port))?
            .probes
            .push(probe);
        Ok(id)
    }

    fn install_lifecycle_hooks(
        &self,
        pipeline: StageId,
        hooks: LifecycleHooks,
    ) -> Result<HookSlot, FrameworkError> {
        let mut inner = self.inner.lock();
        if !inner.pipelines.contains_key(&pipeline) {
            return Err(FrameworkError::UnknownStage(pipeline));
        }
        let slot = HookSlot(inner.next_id());
        inner.hooks.insert(slot, (pipeline, hooks));
        Ok(slot)
    }

    fn remove_lifecycle_hooks(&self, slot: HookSlot) -> bool {
        self.inner.lock().hooks.remove(&slot).is_some()
    }

    fn set_state(&self, pipeline: StageId, state: PipelineState) -> Result<(), FrameworkError> {
        let mut inner = self.inner.lock();
        if inner.fail_state_changes && state != PipelineState::Null {
            return Err(FrameworkError::StateChange(state.to_string()));
        }
        let entry = inner
            .pipelines
            .get_mut(&pipeline)
            .ok_or(FrameworkError::UnknownStage(pipeline))?;
        debug!(from = %entry.state, to = %state, "pipeline state change");
        entry.state = state;
        Ok(())
    }

    fn status_bus(&self, pipeline: StageId) -> Result<Receiver<StatusSignal>, FrameworkError> {
        self.inner
            .lock()
            .pipelines
            .get(&pipeline)
            .map(|p| p.receiver.clone())
            .ok_or(FrameworkError::UnknownStage(pipeline))
    }

    fn dispose(&self, pipeline: StageId) {
        let mut inner = self.inner.lock();
        let doomed: HashSet<StageId> = inner.descendants(pipeline).into_iter().collect();
        if doomed.is_empty() {
            return;
        }
        if let Some(parent) = inner.stages.get(&pipeline).and_then(|s| s.parent) {
            if let Some(parent) = inner.stages.get_mut(&parent) {
                parent.children.retain(|c| *c != pipeline);
            }
        }

        let dead_ports: HashSet<PortId> = inner
            .ports
            .iter()
            .filter(|(_, p)| doomed.contains(&p.stage))
            .map(|(id, _)| *id)
            .collect();
        inner.ports.retain(|id, _| !dead_ports.contains(id));
        for port in inner.ports.values_mut() {
            if port.peer.is_some_and(|p| dead_ports.contains(&p)) {
                port.peer = None;
            }
        }

        inner.stages.retain(|id, _| !doomed.contains(id));
        inner
            .links
            .retain(|(a, b)| !doomed.contains(a) && !doomed.contains(b));
        inner.hooks.retain(|_, (owner, _)| *owner != pipeline);
        inner.pipelines.remove(&pipeline);
        debug!(stages = doomed.len(), "pipeline disposed");
    }
}
