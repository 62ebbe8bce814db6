//! Graph assembly tests against MemoryFramework

use std::sync::Arc;

use pretty_assertions::assert_eq;
use zonewatch_core::framework::PropertyValue;
use zonewatch_core::topology::{factory, names};
use zonewatch_core::{
    BuildParams, ConstructionError, GraphHandle, MediaFramework, MemoryFramework, Platform, StageId,
    StageRole, StreamConfig, TopologyBuilder,
};

/// Helper to create numbered stream configs
fn streams(uris: &[&str]) -> Vec<StreamConfig> {
    (0u32..)
        .zip(uris)
        .map(|(id, uri)| StreamConfig::new(id, *uri))
        .collect()
}

fn params(platform: Platform) -> BuildParams {
    BuildParams::new("/opt/proto/libkafka_proto.so", "localhost;9092").with_platform(platform)
}

fn build(
    fw: &Arc<MemoryFramework>,
    configs: Vec<StreamConfig>,
    params: BuildParams,
) -> Result<GraphHandle, ConstructionError> {
    TopologyBuilder::new(fw.clone(), params).build(configs)
}

fn stage(handle: &GraphHandle, name: &str) -> StageId {
    handle
        .topology()
        .stage(name)
        .unwrap_or_else(|| panic!("missing stage {name}"))
        .stage
}

#[test]
fn test_single_stream_layout() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(&fw, streams(&["file:///videos/a.mp4"]), params(Platform::Other)).unwrap();
    let topology = handle.topology();

    assert_eq!(topology.stage_count(), 14);
    assert_eq!(topology.link_count(), 13);
    assert!(topology.is_acyclic());

    assert_eq!(topology.upstream(names::MUXER), vec!["source-bin-00"]);
    assert_eq!(
        topology.chain_from(names::MUXER),
        vec![
            names::MUXER,
            names::INFERENCE,
            names::CONVERTER_1,
            names::CAPS_FILTER,
            names::TILER,
            names::CONVERTER_2,
            names::OVERLAY,
            names::BRANCH,
        ]
    );
    assert_eq!(topology.branch_points(), vec![names::BRANCH]);
    assert_eq!(
        topology.downstream(names::BRANCH),
        vec![names::RENDER_QUEUE, names::EXPORT_QUEUE]
    );
    assert_eq!(
        topology.chain_from(names::RENDER_QUEUE),
        vec![names::RENDER_QUEUE, names::RENDER_SINK]
    );
    assert_eq!(
        topology.chain_from(names::EXPORT_QUEUE),
        vec![names::EXPORT_QUEUE, names::MSG_CONVERTER, names::MSG_BROKER]
    );
    assert!(topology.stage(names::EGL_TRANSFORM).is_none());

    // Every mirrored link exists in the framework too
    assert_eq!(fw.links().len(), 13);
}

#[test]
fn test_aarch64_inserts_transform() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Aarch64)).unwrap();

    assert_eq!(
        handle.topology().chain_from(names::RENDER_QUEUE),
        vec![names::RENDER_QUEUE, names::EGL_TRANSFORM, names::RENDER_SINK]
    );
    assert_eq!(
        handle.topology().stages_with_role(StageRole::Transform).len(),
        1
    );
}

#[test]
fn test_sources_feed_muxer_in_order() {
    let fw = Arc::new(MemoryFramework::new());
    let uris = ["file:///a.mp4", "file:///b.mp4", "file:///c.mp4"];
    let handle = build(&fw, streams(&uris), params(Platform::Other)).unwrap();

    assert_eq!(
        handle.topology().upstream(names::MUXER),
        vec!["source-bin-00", "source-bin-01", "source-bin-02"]
    );

    let description = handle.topology().describe();
    let mux_inputs: Vec<&str> = description
        .links
        .iter()
        .filter(|l| l.to == names::MUXER)
        .map(|l| l.to_port.as_str())
        .collect();
    assert_eq!(mux_inputs, vec!["sink_0", "sink_1", "sink_2"]);

    for (source, uri) in handle.sources().iter().zip(uris) {
        assert_eq!(fw.property(source.decoder, "uri"), Some(uri.into()));
        assert_eq!(fw.parent_of(source.bin), Some(handle.pipeline()));
    }
}

#[test]
fn test_muxer_properties() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(
        &fw,
        streams(&["file:///a.mp4", "file:///b.mp4"]),
        params(Platform::Other),
    )
    .unwrap();
    let mux = stage(&handle, names::MUXER);

    assert_eq!(fw.property(mux, "width"), Some(PropertyValue::UInt(1920)));
    assert_eq!(fw.property(mux, "height"), Some(PropertyValue::UInt(1080)));
    assert_eq!(fw.property(mux, "batch-size"), Some(PropertyValue::UInt(2)));
    assert_eq!(
        fw.property(mux, "batched-push-timeout"),
        Some(PropertyValue::UInt(40_000))
    );
    assert_eq!(fw.property(mux, "live-source"), None);
}

#[test]
fn test_live_source_marks_muxer_live() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(
        &fw,
        streams(&["file:///a.mp4", "rtsp://camera-2/stream"]),
        params(Platform::Other),
    )
    .unwrap();

    assert_eq!(
        fw.property(stage(&handle, names::MUXER), "live-source"),
        Some(PropertyValue::Bool(true))
    );
}

#[test]
fn test_inference_batch_size_follows_stream_count() {
    let fw = Arc::new(MemoryFramework::new());
    let uris = ["file:///a.mp4", "file:///b.mp4", "file:///c.mp4"];
    let handle = build(
        &fw,
        streams(&uris),
        params(Platform::Other).with_model_config("configs/peoplenet.txt"),
    )
    .unwrap();
    let inference = stage(&handle, names::INFERENCE);

    assert_eq!(fw.property(inference, "batch-size"), Some(PropertyValue::UInt(3)));
    assert_eq!(
        fw.property(inference, "config-file-path"),
        Some("configs/peoplenet.txt".into())
    );
}

#[test]
fn test_tiler_and_caps() {
    let fw = Arc::new(MemoryFramework::new());
    let uris = ["file:///a.mp4"; 5];
    let handle = build(
        &fw,
        streams(&uris),
        params(Platform::Other).with_tiled_size(1920, 1080),
    )
    .unwrap();
    let tiler = stage(&handle, names::TILER);

    assert_eq!(fw.property(tiler, "rows"), Some(PropertyValue::UInt(2)));
    assert_eq!(fw.property(tiler, "columns"), Some(PropertyValue::UInt(3)));
    assert_eq!(fw.property(tiler, "width"), Some(PropertyValue::UInt(1920)));
    assert_eq!(fw.property(tiler, "height"), Some(PropertyValue::UInt(1080)));
    assert_eq!(
        fw.property(stage(&handle, names::CAPS_FILTER), "caps"),
        Some("video/x-raw(memory:NVMM), format=RGBA".into())
    );
}

#[test]
fn test_sink_and_export_properties() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(
        &fw,
        streams(&["file:///a.mp4"]),
        params(Platform::Other)
            .with_payload_type(1)
            .with_topic("zone-events")
            .with_msgconv_config("configs/msgconv.txt"),
    )
    .unwrap();

    let sink = stage(&handle, names::RENDER_SINK);
    assert_eq!(fw.property(sink, "sync"), Some(false.into()));
    assert_eq!(fw.property(sink, "qos"), Some(false.into()));

    let converter = stage(&handle, names::MSG_CONVERTER);
    assert_eq!(fw.property(converter, "payload-type"), Some(PropertyValue::UInt(1)));
    assert_eq!(
        fw.property(converter, "config"),
        Some("configs/msgconv.txt".into())
    );

    let broker = stage(&handle, names::MSG_BROKER);
    assert_eq!(
        fw.property(broker, "proto-lib"),
        Some("/opt/proto/libkafka_proto.so".into())
    );
    assert_eq!(fw.property(broker, "conn-str"), Some("localhost;9092".into()));
    assert_eq!(fw.property(broker, "topic"), Some("zone-events".into()));
    assert_eq!(fw.property(broker, "sync"), Some(false.into()));
}

#[test]
fn test_optional_export_properties_left_unset() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap();

    assert_eq!(fw.property(stage(&handle, names::MSG_BROKER), "topic"), None);
    assert_eq!(fw.property(stage(&handle, names::MSG_CONVERTER), "config"), None);
    assert_eq!(
        fw.property(stage(&handle, names::MSG_CONVERTER), "payload-type"),
        Some(PropertyValue::UInt(0))
    );
}

#[test]
fn test_probe_and_hooks_registered() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap();

    assert_eq!(fw.port_name(handle.probe_port()).as_deref(), Some("sink"));
    assert_eq!(fw.probe_count(handle.probe_port()), 1);
    assert!(handle.hooks_installed());
    assert_eq!(fw.installed_hooks(), 1);
}

#[test]
fn test_stage_failure_leaves_nothing_registered() {
    let factories = [
        factory::MUXER,
        "uridecodebin",
        factory::INFERENCE,
        factory::CONVERTER,
        factory::CAPS_FILTER,
        factory::TILER,
        factory::OVERLAY,
        factory::BRANCH,
        factory::QUEUE,
        factory::EGL_TRANSFORM,
        factory::RENDER_SINK,
        factory::MSG_CONVERTER,
        factory::MSG_BROKER,
    ];

    for failing in factories {
        let fw = Arc::new(MemoryFramework::new());
        fw.fail_factory(failing);

        let err = build(
            &fw,
            streams(&["file:///a.mp4", "file:///b.mp4"]),
            params(Platform::Aarch64),
        )
        .unwrap_err();

        match err {
            ConstructionError::Stage { factory, .. } => assert_eq!(factory, failing),
            other => panic!("{failing}: unexpected error {other:?}"),
        }
        assert_eq!(fw.stage_count(), 0, "{failing} left stages behind");
        assert_eq!(fw.installed_hooks(), 0);
    }
}

#[test]
fn test_container_failures() {
    let fw = Arc::new(MemoryFramework::new());
    fw.fail_factory("pipeline");
    let err = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap_err();
    assert!(matches!(err, ConstructionError::Pipeline(_)));

    let fw = Arc::new(MemoryFramework::new());
    fw.fail_factory("bin");
    let err = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap_err();
    assert_eq!(err, ConstructionError::Bin("source-bin-00".into()));
    assert_eq!(fw.stage_count(), 0);
}

#[test]
fn test_source_bin_refused_by_pipeline_is_disposed() {
    let fw = Arc::new(MemoryFramework::new());
    fw.refuse_adds("bin");
    let err = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap_err();
    assert!(matches!(err, ConstructionError::Registration(_)));
    assert_eq!(fw.stage_count(), 0);
}

#[test]
fn test_branch_links_use_assigned_port_names() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap();

    let description = handle.topology().describe();
    let branch_ports: Vec<(&str, &str)> = description
        .links
        .iter()
        .filter(|l| l.from == names::BRANCH)
        .map(|l| (l.from_port.as_str(), l.to.as_str()))
        .collect();
    assert_eq!(
        branch_ports,
        vec![("src_0", names::RENDER_QUEUE), ("src_1", names::EXPORT_QUEUE)]
    );
}

#[test]
fn test_missing_request_ports_abort() {
    let fw = Arc::new(MemoryFramework::new());
    fw.refuse_requests(factory::MUXER);
    let err = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap_err();
    assert_eq!(
        err,
        ConstructionError::Port {
            stage: names::MUXER.into(),
            port: "sink_0".into()
        }
    );
    assert_eq!(fw.stage_count(), 0);

    let fw = Arc::new(MemoryFramework::new());
    fw.refuse_requests(factory::BRANCH);
    let err = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap_err();
    assert!(matches!(err, ConstructionError::Port { ref stage, .. } if stage == names::BRANCH));
    assert_eq!(fw.stage_count(), 0);
}

#[test]
fn test_invalid_stream_sets_rejected() {
    let fw = Arc::new(MemoryFramework::new());
    let err = build(&fw, Vec::new(), params(Platform::Other)).unwrap_err();
    assert!(matches!(err, ConstructionError::Config(_)));

    let gapped = vec![
        StreamConfig::new(0, "file:///a.mp4"),
        StreamConfig::new(2, "file:///b.mp4"),
    ];
    let err = build(&fw, gapped, params(Platform::Other)).unwrap_err();
    assert!(matches!(err, ConstructionError::Config(_)));
    assert_eq!(fw.stage_count(), 0);
}

#[test]
fn test_dropping_handle_disposes_pipeline() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(&fw, streams(&["file:///a.mp4"]), params(Platform::Other)).unwrap();
    assert!(fw.stage_count() > 0);

    drop(handle);
    assert_eq!(fw.stage_count(), 0);
    assert_eq!(fw.installed_hooks(), 0);
}

#[test]
fn test_describe_serializes() {
    let fw = Arc::new(MemoryFramework::new());
    let handle = build(
        &fw,
        streams(&["file:///a.mp4", "file:///b.mp4", "file:///c.mp4", "file:///d.mp4"]),
        params(Platform::Other),
    )
    .unwrap();

    let json = serde_json::to_value(handle.topology().describe()).unwrap();
    assert_eq!(json["stages"].as_array().map(Vec::len), Some(17));
    assert_eq!(json["grid"]["rows"], 2);
    assert_eq!(json["grid"]["columns"], 2);
    assert_eq!(json["stages"][0]["name"], names::MUXER);
    assert_eq!(json["stages"][0]["role"], "muxer");
}
