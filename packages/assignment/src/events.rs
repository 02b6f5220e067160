//! Analytics events emitted when assignments change.

use serde::{Deserialize, Serialize};
use tracing::info;

pub const PARTITION_ASSIGNED: &str = "xmodule.partitions.assigned_user_to_partition";
pub const LIBRARY_CONTENT_ASSIGNED: &str = "edx.librarycontentblock.content.assigned";
pub const LIBRARY_CONTENT_REMOVED: &str = "edx.librarycontentblock.content.removed";

/// An emitted event: a dotted name and a JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub data: serde_json::Value,
}

pub trait EventSink: Send + Sync {
    fn emit(&mut self, event: Event);
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn emit(&mut self, event: Event) {
        (**self).emit(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn emit(&mut self, event: Event) {
        self.as_mut().emit(event)
    }
}

/// Keeps every event, in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingEventSink {
    events: Vec<Event>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |event| event.name == name)
    }

    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

/// Writes events to the log at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&mut self, event: Event) {
        info!(event = %event.name, data = %event.data, "event");
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionAssigned {
    pub partition_id: i64,
    pub partition_name: String,
    pub group_id: i64,
    pub group_name: String,
}

/// Description of one library child in a library content event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub usage_key: String,
    pub original_usage_key: Option<String>,
    pub original_usage_version: Option<String>,
    /// Every block below the child, depth first.
    pub descendants: Vec<BlockInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Invalid,
    Overlimit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LibraryContentEvent {
    pub location: String,
    pub result: Vec<BlockInfo>,
    pub previous_count: usize,
    pub max_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<Vec<BlockInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<BlockInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RemovalReason>,
}

/// Serialize a payload into an event. Payload types here always serialize.
pub(crate) fn event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event {
        name: name.to_string(),
        data: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
    }
}
