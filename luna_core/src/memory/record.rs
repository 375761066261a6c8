use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse relationship phase with a single counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    #[default]
    Talking,
    Dating,
    Hurt,
}

impl RelationshipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipStatus::Talking => "talking",
            RelationshipStatus::Dating => "dating",
            RelationshipStatus::Hurt => "hurt",
        }
    }
}

impl std::fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remembered message from the counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryEntry {
    pub content: String,
    #[serde(with = "iso_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Durable relationship state for one counterpart identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipRecord {
    pub affection: u32,
    pub history: Vec<HistoryEntry>,
    pub status: RelationshipStatus,
}

impl RelationshipRecord {
    /// Applies `delta` to the affection score, clamping at zero, and returns
    /// the new score.
    pub fn adjust_affection(&mut self, delta: i64) -> u32 {
        let next = (i64::from(self.affection) + delta).clamp(0, i64::from(u32::MAX));
        self.affection = next as u32;
        self.affection
    }

    pub fn remember(&mut self, content: impl Into<String>) {
        self.history.push(HistoryEntry::new(content));
    }
}

/// Timestamps are written as RFC 3339. Files produced by older builds carry
/// naive ISO-8601 values with no offset; those are read as UTC.
mod iso_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| de::Error::custom(format!("invalid timestamp {:?}: {}", raw, e)))
    }
}
