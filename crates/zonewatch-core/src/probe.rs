//! Restricted-zone checks on the dataflow path.
//!
//! [`ZoneViolationProbe`] runs once per batch on a framework thread. For
//! every frame it draws the stream's zones onto the annotation layer, then
//! tests each confident person detection's ground contact point against
//! every zone. Detections inside any zone are highlighted and get an event
//! record attached for the export branch.
//!
//! Configuration is shared read-only; the probe keeps no per-frame state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::framework::{BufferProbe, ProbeReturn};
use crate::geometry::Zone;
use crate::lifecycle::MetadataLifecycleManager;
use crate::tracing::prefix;
use crate::types::{BatchRecord, Color, FrameRecord, OverlayLine};

/// Width of zone outlines on the annotation layer
pub const ZONE_LINE_WIDTH: u32 = 3;

/// Summary of one probe call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// Frames in the batch
    pub frames: usize,
    /// Detections found inside a restricted zone
    pub violations: usize,
    pub elapsed_us: u64,
}

/// Buffer probe performing the per-frame zone checks
#[derive(Debug)]
pub struct ZoneViolationProbe {
    configs: Arc<[StreamConfig]>,
    lifecycle: Arc<MetadataLifecycleManager>,
    budget: Duration,
    batches: AtomicU64,
    violations: AtomicU64,
}

impl ZoneViolationProbe {
    pub fn new(
        configs: Arc<[StreamConfig]>,
        lifecycle: Arc<MetadataLifecycleManager>,
        budget: Duration,
    ) -> Self {
        Self {
            configs,
            lifecycle,
            budget,
            batches: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    /// Batches processed so far
    pub fn batches_seen(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Violations raised so far
    pub fn violations_seen(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    fn config_for(&self, source_id: u32) -> Option<&StreamConfig> {
        self.configs.iter().find(|c| c.id == source_id)
    }

    /// Annotate and check every frame in `batch`.
    pub fn process(&self, batch: &mut BatchRecord) -> ProbeReport {
        let started = Instant::now();
        let mut report = ProbeReport {
            frames: batch.frames.len(),
            ..Default::default()
        };

        for frame in &mut batch.frames {
            let Some(config) = self.config_for(frame.source_id) else {
                debug!(source_id = frame.source_id, "no configuration for source, skipping frame");
                continue;
            };
            draw_zones(frame, &config.restricted_zones);
            report.violations += self.check_frame(frame, config);
        }

        let elapsed = started.elapsed();
        report.elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        if elapsed > self.budget {
            warn!(
                elapsed_us = report.elapsed_us,
                budget_us = self.budget.as_micros() as u64,
                frames = report.frames,
                "zone probe over budget"
            );
        }

        self.batches.fetch_add(1, Ordering::Relaxed);
        self.violations
            .fetch_add(report.violations as u64, Ordering::Relaxed);
        report
    }

    /// Returns the number of violations in `frame`.
    fn check_frame(&self, frame: &mut FrameRecord, config: &StreamConfig) -> usize {
        let mut offenders = Vec::new();

        for (i, detection) in frame.detections.iter_mut().enumerate() {
            detection.border_color = Color::NEUTRAL;
            if !detection.is_person() || detection.confidence < config.confidence_threshold {
                continue;
            }

            let point = detection.bbox.contact_point();
            // Every zone is tested, not just the first
            let zones_hit = config
                .restricted_zones
                .iter()
                .filter(|zone| zone.contains(point))
                .count();
            if zones_hit > 0 {
                detection.border_color = Color::ALARM;
                offenders.push(i);
                debug!(
                    source_id = frame.source_id,
                    frame = frame.frame_number,
                    track_id = detection.track_id,
                    zones = zones_hit,
                    "{} person inside restricted zone",
                    prefix::ALARM
                );
            }
        }

        for &i in &offenders {
            let record = self
                .lifecycle
                .create_event_record(&frame.detections[i], frame);
            frame.events.push(record);
        }
        offenders.len()
    }
}

impl BufferProbe for ZoneViolationProbe {
    fn on_buffer(&self, batch: &mut BatchRecord) -> ProbeReturn {
        self.process(batch);
        ProbeReturn::Pass
    }
}

/// Add every zone segment to the frame's annotation layer.
fn draw_zones(frame: &mut FrameRecord, zones: &[Zone]) {
    let lines = zones
        .iter()
        .flat_map(|zone| zone.segments())
        .map(|segment| OverlayLine {
            x1: segment.start.x as f32,
            y1: segment.start.y as f32,
            x2: segment.end.x as f32,
            y2: segment.end.y as f32,
            width: ZONE_LINE_WIDTH,
            color: Color::ZONE,
        });
    frame.overlay.extend(lines);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, ObjectDetection};
    use pretty_assertions::assert_eq;

    fn square(offset: f64) -> Zone {
        Zone::from_corners(&[
            (offset, offset),
            (offset + 100.0, offset),
            (offset + 100.0, offset + 100.0),
            (offset, offset + 100.0),
        ])
    }

    fn probe_with(configs: Vec<StreamConfig>) -> ZoneViolationProbe {
        ZoneViolationProbe::new(
            configs.into(),
            Arc::new(MetadataLifecycleManager::new()),
            Duration::from_millis(5),
        )
    }

    /// Person whose feet land on `(x, y)`
    fn person_at(x: f32, y: f32, confidence: f32) -> ObjectDetection {
        ObjectDetection::new(0, confidence, BoundingBox::new(y - 40.0, x - 10.0, 20.0, 40.0))
    }

    #[test]
    fn test_person_in_zone_raises_alarm() {
        let probe = probe_with(vec![StreamConfig::new(0, "file:///a.mp4").with_zone(square(0.0))]);
        let mut batch = BatchRecord::new(vec![FrameRecord::new(0, 12)
            .with_detections(vec![person_at(50.0, 50.0, 0.9).with_track_id(7)])]);

        let report = probe.process(&mut batch);
        assert_eq!(report.frames, 1);
        assert_eq!(report.violations, 1);

        let frame = &batch.frames[0];
        assert_eq!(frame.detections[0].border_color, Color::ALARM);
        assert_eq!(frame.events.len(), 1);
        assert_eq!(frame.events[0].track_id, 7);
        assert_eq!(frame.events[0].frame_id, 12);
    }

    #[test]
    fn test_person_outside_zone_stays_neutral() {
        let probe = probe_with(vec![StreamConfig::new(0, "file:///a.mp4").with_zone(square(0.0))]);
        let mut outside = person_at(150.0, 150.0, 0.9);
        outside.border_color = Color::ALARM;
        let mut batch =
            BatchRecord::new(vec![FrameRecord::new(0, 1).with_detections(vec![outside])]);

        assert_eq!(probe.process(&mut batch).violations, 0);
        assert_eq!(batch.frames[0].detections[0].border_color, Color::NEUTRAL);
        assert!(batch.frames[0].events.is_empty());
    }

    #[test]
    fn test_non_person_and_low_confidence_are_not_evaluated() {
        let probe = probe_with(vec![StreamConfig::new(0, "file:///a.mp4")
            .with_zone(square(0.0))
            .with_confidence(0.6)]);
        let mut car = person_at(50.0, 50.0, 0.99);
        car.class_id = 2;
        let unsure = person_at(50.0, 50.0, 0.59);
        let mut batch =
            BatchRecord::new(vec![FrameRecord::new(0, 1).with_detections(vec![car, unsure])]);

        assert_eq!(probe.process(&mut batch).violations, 0);
        for detection in &batch.frames[0].detections {
            assert_eq!(detection.border_color, Color::NEUTRAL);
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let probe = probe_with(vec![StreamConfig::new(0, "file:///a.mp4")
            .with_zone(square(0.0))
            .with_confidence(0.6)]);
        let mut batch = BatchRecord::new(vec![
            FrameRecord::new(0, 1).with_detections(vec![person_at(50.0, 50.0, 0.6)])
        ]);
        assert_eq!(probe.process(&mut batch).violations, 1);
    }

    #[test]
    fn test_every_zone_is_evaluated() {
        // Point only inside the second zone
        let probe = probe_with(vec![StreamConfig::new(0, "file:///a.mp4")
            .with_zone(square(0.0))
            .with_zone(square(500.0))]);
        let mut batch = BatchRecord::new(vec![
            FrameRecord::new(0, 1).with_detections(vec![person_at(550.0, 550.0, 0.9)])
        ]);

        assert_eq!(probe.process(&mut batch).violations, 1);
        assert_eq!(batch.frames[0].detections[0].border_color, Color::ALARM);
    }

    #[test]
    fn test_contact_point_is_bottom_center() {
        let probe = probe_with(vec![StreamConfig::new(0, "file:///a.mp4").with_zone(square(0.0))]);
        // Box body is inside the zone but the feet are below it
        let tall = ObjectDetection::new(0, 0.9, BoundingBox::new(50.0, 40.0, 20.0, 80.0));
        let mut batch = BatchRecord::new(vec![FrameRecord::new(0, 1).with_detections(vec![tall])]);

        assert_eq!(probe.process(&mut batch).violations, 0);
    }

    #[test]
    fn test_zones_are_drawn_per_frame() {
        let probe = probe_with(vec![
            StreamConfig::new(0, "file:///a.mp4").with_zone(square(0.0)),
            StreamConfig::new(1, "file:///b.mp4"),
        ]);
        let mut batch = BatchRecord::new(vec![FrameRecord::new(0, 1), FrameRecord::new(1, 1)]);
        probe.process(&mut batch);

        let overlay = &batch.frames[0].overlay;
        assert_eq!(overlay.len(), 4);
        assert!(overlay
            .iter()
            .all(|line| line.width == ZONE_LINE_WIDTH && line.color == Color::ZONE));
        assert_eq!(
            overlay[0],
            OverlayLine {
                x1: 0.0,
                y1: 0.0,
                x2: 100.0,
                y2: 0.0,
                width: 3,
                color: Color::ZONE
            }
        );
        assert!(batch.frames[1].overlay.is_empty());
    }

    #[test]
    fn test_unknown_source_is_skipped() {
        let probe = probe_with(vec![StreamConfig::new(0, "file:///a.mp4").with_zone(square(0.0))]);
        let mut batch = BatchRecord::new(vec![
            FrameRecord::new(4, 1).with_detections(vec![person_at(50.0, 50.0, 0.9)])
        ]);

        let report = probe.process(&mut batch);
        assert_eq!(report.violations, 0);
        assert!(batch.frames[0].overlay.is_empty());
        assert_eq!(probe.batches_seen(), 1);
    }

    #[test]
    fn test_buffer_always_passes() {
        let probe = probe_with(vec![StreamConfig::new(0, "file:///a.mp4")]);
        let mut batch = BatchRecord::default();
        assert_eq!(probe.on_buffer(&mut batch), ProbeReturn::Pass);
    }
}
