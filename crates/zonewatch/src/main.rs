//! Zonewatch - Main Entry Point
//!
//! Builds the restricted-zone analytics graph for the configured streams
//! and drives it until end of stream, a fault, or Ctrl+C.
//!
//! The graph is assembled against the in-process framework, so a run
//! checks configuration and topology without touching media.
//!
//! Usage:
//!     zonewatch --config-path configs/streams.json \
//!         --protolib-path /opt/proto/libkafka_proto.so \
//!         --connection-string "localhost;9092"
//!     zonewatch --config-path configs/streams.json ... --describe

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use zonewatch_core::framework::NegotiatedCaps;
use zonewatch_core::source_bin::NVMM_FEATURE;
use zonewatch_core::{
    AppConfig, BindingState, BuildParams, EventLoopController, MediaFramework, MemoryFramework,
    StatusSignal, TopologyBuilder,
};

#[derive(Parser, Debug)]
#[command(name = "zonewatch")]
#[command(about = "Multi-stream restricted-zone intrusion analytics")]
#[command(version)]
struct Args {
    /// Stream configuration (JSON keyed by stream index)
    #[arg(long)]
    config_path: String,

    /// Protocol adapter library for the message broker
    #[arg(long)]
    protolib_path: String,

    /// Broker connection string
    #[arg(long)]
    connection_string: String,

    /// Event payload schema
    #[arg(long, default_value = "0")]
    payload_type: u32,

    /// Broker topic
    #[arg(long)]
    topic: Option<String>,

    /// Message converter configuration file
    #[arg(long)]
    msgconv_config: Option<String>,

    /// Inference configuration file
    #[arg(long, default_value = "configs/model_config.txt")]
    model_config_path: String,

    /// Composited output width
    #[arg(long, default_value = "1280")]
    tiled_width: u32,

    /// Composited output height
    #[arg(long, default_value = "720")]
    tiled_height: u32,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the assembled topology as JSON and exit
    #[arg(long)]
    describe: bool,
}

impl Args {
    fn build_params(&self) -> BuildParams {
        let mut params = BuildParams::new(&self.protolib_path, &self.connection_string)
            .with_payload_type(self.payload_type)
            .with_model_config(&self.model_config_path)
            .with_tiled_size(self.tiled_width, self.tiled_height);
        if let Some(topic) = &self.topic {
            params = params.with_topic(topic);
        }
        if let Some(config) = &self.msgconv_config {
            params = params.with_msgconv_config(config);
        }
        params
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    zonewatch_core::tracing::init(&args.log_level)?;

    info!("Starting zonewatch v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_path(&args.config_path)?;
    info!(streams = config.streams.len(), "Configuration loaded");

    let framework = Arc::new(MemoryFramework::new());
    let graph = TopologyBuilder::new(framework.clone(), args.build_params())
        .build(config.streams)?;

    if args.describe {
        let description = graph.topology().describe();
        println!("{}", serde_json::to_string_pretty(&description)?);
        return Ok(());
    }

    // Play each decoder negotiating accelerated video so source outputs bind
    for source in graph.sources() {
        let caps = NegotiatedCaps::new("video/x-raw", &[NVMM_FEATURE]);
        if let Err(e) = framework.emit_pad_added(source.decoder, caps) {
            warn!(source = %source.name, error = %e, "decoder negotiation failed");
        }
        match source.binding.state() {
            BindingState::Bound(_) => info!(source = %source.name, "source bound"),
            state => warn!(source = %source.name, ?state, "source not bound"),
        }
    }

    let mut controller = EventLoopController::new(graph);

    let stop = controller.status_sender();
    ctrlc::set_handler(move || {
        let _ = stop.send(StatusSignal::EndOfStream);
    })?;

    info!(
        pipeline = ?framework.stage_name(controller.graph().pipeline()),
        "Running until end of stream (Ctrl+C to stop)"
    );
    if let Err(e) = controller.run() {
        error!(error = %e, "Pipeline stopped with an error");
        return Err(e.into());
    }

    info!("Pipeline finished");
    Ok(())
}
