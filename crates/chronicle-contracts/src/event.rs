//! Event type tags.
//!
//! `EventType` is the discriminant stored in every entry.  The known kinds are
//! a closed set; anything else round-trips through `Other` so logs written by
//! newer producers still load and verify.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The kind of event an entry records.
///
/// Serialized as its SCREAMING_SNAKE_CASE tag (e.g. `"EXCHANGE"`), which is
/// also the exact string that enters the entry hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    /// One user/assistant turn.
    Exchange,
    /// A human correction of earlier output.
    Correction,
    /// The assistant flagged low confidence.
    Uncertainty,
    /// A sidebar context was spawned from a parent.
    SidebarSpawn,
    /// A sidebar was merged back into its parent.
    SidebarMerge,
    /// A sidebar was archived without merging.
    SidebarArchive,
    /// An operational error worth keeping on record.
    Error,
    /// A backup of external state was taken.
    Backup,
    /// Any tag not known to this build.
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Exchange => "EXCHANGE",
            EventType::Correction => "CORRECTION",
            EventType::Uncertainty => "UNCERTAINTY",
            EventType::SidebarSpawn => "SIDEBAR_SPAWN",
            EventType::SidebarMerge => "SIDEBAR_MERGE",
            EventType::SidebarArchive => "SIDEBAR_ARCHIVE",
            EventType::Error => "ERROR",
            EventType::Backup => "BACKUP",
            EventType::Other(tag) => tag,
        }
    }

    /// True for the sidebar lifecycle kinds.
    pub fn is_sidebar_lifecycle(&self) -> bool {
        matches!(
            self,
            EventType::SidebarSpawn | EventType::SidebarMerge | EventType::SidebarArchive
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "EXCHANGE" => EventType::Exchange,
            "CORRECTION" => EventType::Correction,
            "UNCERTAINTY" => EventType::Uncertainty,
            "SIDEBAR_SPAWN" => EventType::SidebarSpawn,
            "SIDEBAR_MERGE" => EventType::SidebarMerge,
            "SIDEBAR_ARCHIVE" => EventType::SidebarArchive,
            "ERROR" => EventType::Error,
            "BACKUP" => EventType::Backup,
            other => EventType::Other(other.to_string()),
        })
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        EventType::from(s.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(EventType::from(tag))
    }
}
