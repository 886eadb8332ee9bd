//! Typed payload schema and builders.
//!
//! Each known `EventType` has a strongly typed payload struct.  Callers build
//! one of these, wrap it in `EventPayload`, and hand it to the ledger; the
//! ledger stores the payload as a plain JSON object and hashes its canonical
//! form.  Building a payload never touches the ledger.
//!
//! Unknown kinds travel as `EventPayload::Raw` so newer producers can log
//! events this build does not model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::EventType;

type Object = Map<String, Value>;

// ── Payload structs ───────────────────────────────────────────────────────────

/// One conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePayload {
    pub user: String,
    pub assistant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ExchangePayload {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A human correction: what was said, and what should have been said.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionPayload {
    pub was: String,
    pub should_be: String,
    /// Free-form class used to group recurring corrections
    /// (e.g. `"date-format"`, `"tone"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Sequence of the entry being corrected, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects_sequence: Option<u64>,
}

impl CorrectionPayload {
    pub fn new(was: impl Into<String>, should_be: impl Into<String>) -> Self {
        Self {
            was: was.into(),
            should_be: should_be.into(),
            category: None,
            corrects_sequence: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn correcting(mut self, sequence: u64) -> Self {
        self.corrects_sequence = Some(sequence);
        self
    }
}

/// The assistant signalled it was unsure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyPayload {
    pub topic: String,
    pub detail: String,
    /// Self-reported confidence in `[0.0, 1.0]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl UncertaintyPayload {
    pub fn new(topic: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            detail: detail.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Body shared by the three sidebar lifecycle events.
///
/// The lifecycle step itself is carried by the event type, so one struct
/// serves spawn, merge, and archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebarPayload {
    pub sidebar_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SidebarPayload {
    pub fn new(sidebar_id: impl Into<String>) -> Self {
        Self {
            sidebar_id: sidebar_id.into(),
            parent_id: None,
            reason: None,
            summary: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn spawned(self) -> EventPayload {
        EventPayload::SidebarSpawn(self)
    }

    pub fn merged(self) -> EventPayload {
        EventPayload::SidebarMerge(self)
    }

    pub fn archived(self) -> EventPayload {
        EventPayload::SidebarArchive(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub component: String,
    pub message: String,
    #[serde(default)]
    pub recoverable: bool,
}

impl ErrorPayload {
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
            recoverable: false,
        }
    }

    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }
}

/// A backup of external state (conversation store, config) was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupPayload {
    pub target: String,
    pub location: String,
    pub item_count: u64,
}

// ── Tagged variant ────────────────────────────────────────────────────────────

/// A payload tagged with the event kind it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Exchange(ExchangePayload),
    Correction(CorrectionPayload),
    Uncertainty(UncertaintyPayload),
    SidebarSpawn(SidebarPayload),
    SidebarMerge(SidebarPayload),
    SidebarArchive(SidebarPayload),
    Error(ErrorPayload),
    Backup(BackupPayload),
    /// Forward-compatible catch-all: any event type with an arbitrary object.
    Raw { event_type: EventType, body: Object },
}

impl EventPayload {
    /// The event type this payload is logged under.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Exchange(_) => EventType::Exchange,
            EventPayload::Correction(_) => EventType::Correction,
            EventPayload::Uncertainty(_) => EventType::Uncertainty,
            EventPayload::SidebarSpawn(_) => EventType::SidebarSpawn,
            EventPayload::SidebarMerge(_) => EventType::SidebarMerge,
            EventPayload::SidebarArchive(_) => EventType::SidebarArchive,
            EventPayload::Error(_) => EventType::Error,
            EventPayload::Backup(_) => EventType::Backup,
            EventPayload::Raw { event_type, .. } => event_type.clone(),
        }
    }

    /// Serialize the inner payload to the JSON object that gets stored.
    pub fn to_object(&self) -> Result<Object, serde_json::Error> {
        let value = match self {
            EventPayload::Exchange(p) => serde_json::to_value(p)?,
            EventPayload::Correction(p) => serde_json::to_value(p)?,
            EventPayload::Uncertainty(p) => serde_json::to_value(p)?,
            EventPayload::SidebarSpawn(p)
            | EventPayload::SidebarMerge(p)
            | EventPayload::SidebarArchive(p) => serde_json::to_value(p)?,
            EventPayload::Error(p) => serde_json::to_value(p)?,
            EventPayload::Backup(p) => serde_json::to_value(p)?,
            EventPayload::Raw { body, .. } => return Ok(body.clone()),
        };
        match value {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "payload must serialize to a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Decode a stored object back into the variant selected by `event_type`.
    pub fn decode(event_type: &EventType, body: &Object) -> Result<Self, serde_json::Error> {
        let value = Value::Object(body.clone());
        Ok(match event_type {
            EventType::Exchange => EventPayload::Exchange(serde_json::from_value(value)?),
            EventType::Correction => EventPayload::Correction(serde_json::from_value(value)?),
            EventType::Uncertainty => EventPayload::Uncertainty(serde_json::from_value(value)?),
            EventType::SidebarSpawn => EventPayload::SidebarSpawn(serde_json::from_value(value)?),
            EventType::SidebarMerge => EventPayload::SidebarMerge(serde_json::from_value(value)?),
            EventType::SidebarArchive => {
                EventPayload::SidebarArchive(serde_json::from_value(value)?)
            }
            EventType::Error => EventPayload::Error(serde_json::from_value(value)?),
            EventType::Backup => EventPayload::Backup(serde_json::from_value(value)?),
            EventType::Other(_) => EventPayload::Raw {
                event_type: event_type.clone(),
                body: body.clone(),
            },
        })
    }
}

impl From<ExchangePayload> for EventPayload {
    fn from(p: ExchangePayload) -> Self {
        EventPayload::Exchange(p)
    }
}

impl From<CorrectionPayload> for EventPayload {
    fn from(p: CorrectionPayload) -> Self {
        EventPayload::Correction(p)
    }
}

impl From<UncertaintyPayload> for EventPayload {
    fn from(p: UncertaintyPayload) -> Self {
        EventPayload::Uncertainty(p)
    }
}

impl From<ErrorPayload> for EventPayload {
    fn from(p: ErrorPayload) -> Self {
        EventPayload::Error(p)
    }
}

impl From<BackupPayload> for EventPayload {
    fn from(p: BackupPayload) -> Self {
        EventPayload::Backup(p)
    }
}

/// Short name of a JSON value's kind, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
