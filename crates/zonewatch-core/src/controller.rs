//! Control loop for an assembled graph.
//!
//! ```text
//!  Built ──run()──▶ Playing ──end of stream──▶ Stopped
//!    │                 │
//!    │                 └──error signal──▶ clean() ──▶ Stopped + Err(RuntimeFault)
//!    └──clean()───────────────────────────────────────▶ Stopped
//! ```
//!
//! The controller blocks on the calling thread, waiting on the pipeline's
//! status channel and on its own injection channel. It spawns nothing;
//! dataflow threads belong to the framework. A pipeline status channel that
//! disconnects before end-of-stream is a fault.

use std::fmt;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{Error, Result, RuntimeFault};
use crate::framework::{PipelineState, StatusSignal};
use crate::topology::{GraphHandle, Topology};
use crate::tracing::prefix;

/// Lifecycle state of an assembled graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GraphState {
    Built,
    Playing,
    Stopped,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Built => write!(f, "built"),
            Self::Playing => write!(f, "playing"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Drives a [`GraphHandle`] from build to teardown.
#[derive(Debug)]
pub struct EventLoopController {
    graph: GraphHandle,
    state: GraphState,
    cleaned: bool,
    injector: Sender<StatusSignal>,
    injected: Receiver<StatusSignal>,
}

impl EventLoopController {
    pub fn new(graph: GraphHandle) -> Self {
        let (injector, injected) = unbounded();
        Self {
            graph,
            state: GraphState::Built,
            cleaned: false,
            injector,
            injected,
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn topology(&self) -> &Topology {
        self.graph.topology()
    }

    pub fn graph(&self) -> &GraphHandle {
        &self.graph
    }

    /// Injector for status signals, e.g. to force end-of-stream from a
    /// signal handler. Separate from the pipeline's own channel.
    pub fn status_sender(&self) -> Sender<StatusSignal> {
        self.injector.clone()
    }

    /// Play the graph and block until end-of-stream or a fault.
    ///
    /// Only valid from [`GraphState::Built`]. The graph is cleaned on every
    /// exit path.
    pub fn run(&mut self) -> Result<()> {
        if self.state != GraphState::Built {
            return Err(Error::InvalidState {
                action: "run",
                state: self.state,
            });
        }

        info!("{} Starting pipeline", prefix::PLAY_OPEN);
        if let Err(e) = self
            .graph
            .framework
            .set_state(self.graph.pipeline, PipelineState::Playing)
        {
            error!(error = %e, "pipeline refused to play");
            self.clean();
            return Err(e.into());
        }
        self.state = GraphState::Playing;

        let bus = self.graph.bus.clone();
        let injected = self.injected.clone();
        loop {
            let signal = select! {
                recv(bus) -> signal => signal,
                recv(injected) -> signal => signal,
            };
            match signal {
                Ok(StatusSignal::EndOfStream) => {
                    info!("End of stream");
                    self.clean();
                    return Ok(());
                }
                Ok(StatusSignal::Warning(msg)) => {
                    warn!(
                        origin = %msg.origin,
                        debug = msg.debug.as_deref().unwrap_or(""),
                        "{}",
                        msg.message
                    );
                }
                Ok(StatusSignal::Error(msg)) => {
                    error!(
                        origin = %msg.origin,
                        debug = msg.debug.as_deref().unwrap_or(""),
                        "{}",
                        msg.message
                    );
                    self.clean();
                    return Err(RuntimeFault::from(msg).into());
                }
                Err(_) => {
                    let fault = RuntimeFault::channel_closed();
                    error!("{}", fault);
                    self.clean();
                    return Err(fault.into());
                }
            }
        }
    }

    /// Remove the lifecycle hooks and force the pipeline to its null state.
    /// Later calls do nothing.
    pub fn clean(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        self.state = GraphState::Stopped;

        if let Some(slot) = self.graph.hooks.take() {
            self.graph.framework.remove_lifecycle_hooks(slot);
        }
        if let Err(e) = self
            .graph
            .framework
            .set_state(self.graph.pipeline, PipelineState::Null)
        {
            warn!(error = %e, "failed to reset pipeline");
        }

        let stats = self.graph.lifecycle.stats();
        info!(
            duplicated = stats.duplicated,
            released = stats.released,
            violations = self.graph.probe.violations_seen(),
            "{} Pipeline cleaned up",
            prefix::PLAY_CLOSE
        );
    }
}

impl Drop for EventLoopController {
    fn drop(&mut self) {
        self.clean();
    }
}
