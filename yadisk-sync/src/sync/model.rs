use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

use super::result::FailureKind;

#[derive(Debug, Error)]
#[error("unparsable remote timestamp: {value}")]
pub struct TimestampParseError {
    pub value: String,
}

/// Modification instant normalized to UTC nanoseconds since the Unix epoch.
///
/// Local clocks report naive `SystemTime`s while the remote store reports
/// RFC 3339 strings with an offset; both collapse into this single
/// offset-free representation before any ordering happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Sentinel for remote timestamps that fail to parse: every real
    /// instant orders after it.
    pub const EARLIEST: Timestamp = Timestamp(i64::MIN);

    pub fn from_unix_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds.saturating_mul(1_000_000_000))
    }

    pub fn unix_nanos(self) -> i64 {
        self.0
    }

    pub fn from_datetime(value: OffsetDateTime) -> Self {
        let nanos = value.unix_timestamp_nanos();
        Self(nanos.clamp(i64::MIN as i128 + 1, i64::MAX as i128) as i64)
    }

    pub fn from_system_time(value: SystemTime) -> Self {
        Self::from_datetime(OffsetDateTime::from(value))
    }

    /// Accepts RFC 3339 / ISO 8601 with an offset, or a naive ISO 8601
    /// date-time which is taken to be UTC.
    pub fn parse_remote(value: &str) -> Result<Self, TimestampParseError> {
        let value = value.trim();
        if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
            return Ok(Self::from_datetime(parsed));
        }
        if let Ok(parsed) = OffsetDateTime::parse(value, &Iso8601::DEFAULT) {
            return Ok(Self::from_datetime(parsed));
        }
        if let Ok(parsed) = PrimitiveDateTime::parse(value, &Iso8601::DEFAULT) {
            return Ok(Self::from_datetime(parsed.assume_utc()));
        }
        Err(TimestampParseError {
            value: value.to_string(),
        })
    }

    pub fn parse_remote_or_earliest(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::EARLIEST;
        };
        match Self::parse_remote(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "falling back to earliest instant");
                Self::EARLIEST
            }
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::EARLIEST {
            return f.write_str("<earliest>");
        }
        match OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0))
            .ok()
            .and_then(|value| value.format(&Rfc3339).ok())
        {
            Some(formatted) => f.write_str(&formatted),
            None => write!(f, "{}ns", self.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(EntryKind::File),
            "dir" => Some(EntryKind::Dir),
            _ => None,
        }
    }
}

/// Where a file lives on the side that observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Local(PathBuf),
    Remote(String),
}

/// One file as observed on one side of a directory level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub modified: Timestamp,
    pub digest: String,
    pub locator: Locator,
}

impl FileEntry {
    pub fn same_content(&self, other: &FileEntry) -> bool {
        self.digest.eq_ignore_ascii_case(&other.digest)
    }
}

/// Immediate children of one directory on one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    pub files: BTreeMap<String, FileEntry>,
    pub dirs: BTreeSet<String>,
}

impl DirectorySnapshot {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    pub fn insert_file(&mut self, entry: FileEntry) {
        self.files.insert(entry.name.clone(), entry);
    }
}

/// Outcome of listing one side. A failed listing stays distinguishable from
/// a directory that is legitimately empty.
#[derive(Debug, Clone)]
pub enum Listing {
    Available(DirectorySnapshot),
    Unavailable { kind: FailureKind, reason: String },
}

impl Listing {
    pub fn snapshot(&self) -> Option<&DirectorySnapshot> {
        match self {
            Listing::Available(snapshot) => Some(snapshot),
            Listing::Unavailable { .. } => None,
        }
    }
}
