//! Event record lifecycle.
//!
//! Event records ride on frame metadata down the export path. The media
//! framework decides when a record crosses an asynchronous boundary and when
//! the last reference goes away; at those points it calls the two hooks in
//! [`LifecycleHooks`], which route to [`MetadataLifecycleManager::duplicate`]
//! and [`MetadataLifecycleManager::release`].
//!
//! # Ownership Rules
//!
//! - `duplicate()` returns a fully independent record; nothing is shared
//!   with the source, so releasing either side never touches the other
//! - `release()` drops the variable-length buffers and leaves them `None`
//! - Releasing an already-released record is a no-op

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::trace;

use crate::types::{BoundingBox, FrameRecord, ObjectDetection};

/// Maximum length of the RFC 3339 timestamp text
pub const MAX_TIMESTAMP_LEN: usize = 32;

/// Label reported for the only sensor this deployment publishes as
pub const DEFAULT_SENSOR_LABEL: &str = "sensor-0";

/// Kind of event published to the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    Entry,
    Exit,
}

/// Kind of object an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectType {
    Person,
    Vehicle,
    Unknown,
}

/// Per-object event metadata handed to the event converter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub sensor_id: i32,
    pub place_id: i32,
    pub module_id: i32,
    /// Owned label buffer (`None` once released)
    pub sensor_label: Option<String>,
    /// Owned RFC 3339 timestamp buffer (`None` once released)
    pub timestamp: Option<String>,
    pub bbox: BoundingBox,
    pub frame_id: u64,
    pub track_id: u64,
    pub confidence: f32,
    pub event_type: EventType,
    pub object_type: ObjectType,
    pub class_id: u32,
    /// Optional re-identification signature
    pub object_signature: Option<Vec<u8>>,
}

impl EventRecord {
    /// True once every variable-length buffer has been released
    pub fn is_released(&self) -> bool {
        self.sensor_label.is_none() && self.timestamp.is_none() && self.object_signature.is_none()
    }
}

/// Counters for hook activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleStats {
    pub duplicated: u64,
    pub released: u64,
}

/// Implements the duplicate/release contract for [`EventRecord`]s.
///
/// Safe to call from any dataflow thread.
#[derive(Debug, Default)]
pub struct MetadataLifecycleManager {
    duplicated: AtomicU64,
    released: AtomicU64,
}

impl MetadataLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce an independent deep copy of `source`.
    pub fn duplicate(&self, source: &EventRecord) -> EventRecord {
        self.duplicated.fetch_add(1, Ordering::Relaxed);
        let copy = EventRecord {
            sensor_label: source.sensor_label.as_deref().map(str::to_owned),
            timestamp: source.timestamp.as_deref().map(str::to_owned),
            object_signature: source
                .object_signature
                .as_ref()
                .filter(|sig| !sig.is_empty())
                .map(|sig| sig.to_vec()),
            ..*source
        };
        trace!(track_id = copy.track_id, "event record duplicated");
        copy
    }

    /// Drop the record's variable-length buffers. No-op when already released.
    pub fn release(&self, record: &mut EventRecord) {
        if record.is_released() {
            return;
        }
        record.timestamp = None;
        record.sensor_label = None;
        record.object_signature = None;
        self.released.fetch_add(1, Ordering::Relaxed);
        trace!(track_id = record.track_id, "event record released");
    }

    /// Build a record for `detection` in `frame`, stamped with the current time.
    pub fn create_event_record(
        &self,
        detection: &ObjectDetection,
        frame: &FrameRecord,
    ) -> EventRecord {
        create_event_record_at(detection, frame, Utc::now())
    }

    pub fn stats(&self) -> LifecycleStats {
        LifecycleStats {
            duplicated: self.duplicated.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }

    /// Callback pair for the framework's metadata slots.
    pub fn hooks(self: &Arc<Self>) -> LifecycleHooks {
        let dup = Arc::clone(self);
        let rel = Arc::clone(self);
        LifecycleHooks {
            duplicate: Arc::new(move |record: &EventRecord| dup.duplicate(record)),
            release: Arc::new(move |record: &mut EventRecord| rel.release(record)),
        }
    }
}

/// Build an event record with an explicit timestamp.
pub fn create_event_record_at(
    detection: &ObjectDetection,
    frame: &FrameRecord,
    now: DateTime<Utc>,
) -> EventRecord {
    EventRecord {
        sensor_id: 0,
        place_id: 0,
        module_id: 0,
        sensor_label: Some(DEFAULT_SENSOR_LABEL.to_string()),
        timestamp: Some(format_timestamp(now)),
        bbox: detection.bbox,
        frame_id: frame.frame_number,
        track_id: detection.track_id,
        confidence: detection.confidence,
        event_type: EventType::Entry,
        object_type: ObjectType::Person,
        class_id: detection.class_id,
        object_signature: None,
    }
}

fn format_timestamp(now: DateTime<Utc>) -> String {
    let mut ts = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    ts.truncate(MAX_TIMESTAMP_LEN);
    ts
}

/// The two callback slots the framework invokes on event metadata.
#[derive(Clone)]
pub struct LifecycleHooks {
    pub duplicate: Arc<dyn Fn(&EventRecord) -> EventRecord + Send + Sync>,
    pub release: Arc<dyn Fn(&mut EventRecord) + Send + Sync>,
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks").finish_non_exhaustive()
    }
}
