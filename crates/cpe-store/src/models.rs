use cpe_name::{truncate_chars, CpeComponents};
use ingest_core::Source;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

pub type RecordId = i64;
pub type ImportLogId = i64;

pub const CPE_NAME_MAX: usize = 500;
pub const CPE_NAME_ID_MAX: usize = 100;
pub const PART_MAX: usize = 1;
pub const VENDOR_MAX: usize = 200;
pub const PRODUCT_MAX: usize = 200;
pub const FIELD_MAX: usize = 100;
pub const LANGUAGE_MAX: usize = 10;

/// Milliseconds since the unix epoch.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// A CPE dictionary entry as it is written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpeEntry {
    pub cpe_name: String,
    pub cpe_name_id: String,
    pub components: CpeComponents,
    pub deprecated: bool,
    pub deprecated_by: Option<Vec<String>>,
}

impl CpeEntry {
    /// Cut every column down to its stored width and drop `deprecated_by`
    /// on entries that are not deprecated.
    pub fn clamped(mut self) -> Self {
        let c = &mut self.components;
        c.part = truncate_chars(&c.part, PART_MAX);
        c.vendor = truncate_chars(&c.vendor, VENDOR_MAX);
        c.product = truncate_chars(&c.product, PRODUCT_MAX);
        for f in [
            &mut c.version,
            &mut c.update,
            &mut c.edition,
            &mut c.sw_edition,
            &mut c.target_sw,
            &mut c.target_hw,
            &mut c.other,
        ] {
            let cut = truncate_chars(f, FIELD_MAX);
            *f = cut;
        }
        c.language = truncate_chars(&c.language, LANGUAGE_MAX);
        self.cpe_name = truncate_chars(&self.cpe_name, CPE_NAME_MAX);
        self.cpe_name_id = truncate_chars(&self.cpe_name_id, CPE_NAME_ID_MAX);
        if !self.deprecated {
            self.deprecated_by = None;
        }
        self
    }

    pub fn components(&self) -> &CpeComponents { &self.components }

    pub fn is_application(&self) -> bool { self.components.part == "a" }
    pub fn is_operating_system(&self) -> bool { self.components.part == "o" }
    pub fn is_hardware(&self) -> bool { self.components.part == "h" }

    pub fn kind_label(&self) -> &'static str {
        match self.components.part.as_str() {
            "a" => "Application",
            "o" => "Operating System",
            "h" => "Hardware",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for CpeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = if self.components.version.is_empty() { "*" } else { &self.components.version };
        write!(f, "{} {} {}", self.components.vendor, self.components.product, version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpeRecord {
    pub record_id: RecordId,
    pub entry: CpeEntry,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What a write did to the row keyed by `cpe_name_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportOperation {
    FullImport,
    Incremental,
}

impl ImportOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            ImportOperation::FullImport => "FULL_IMPORT",
            ImportOperation::Incremental => "INCREMENTAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FULL_IMPORT" => Some(ImportOperation::FullImport),
            "INCREMENTAL" => Some(ImportOperation::Incremental),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStatus {
    Started,
    Success,
    Failed,
    Partial,
}

impl ImportStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ImportStatus::Started => "STARTED",
            ImportStatus::Success => "SUCCESS",
            ImportStatus::Failed => "FAILED",
            ImportStatus::Partial => "PARTIAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STARTED" => Some(ImportStatus::Started),
            "SUCCESS" => Some(ImportStatus::Success),
            "FAILED" => Some(ImportStatus::Failed),
            "PARTIAL" => Some(ImportStatus::Partial),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool { self != ImportStatus::Started }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for ImportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One import attempt, from STARTED to its terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLog {
    pub log_id: ImportLogId,
    pub source: Source,
    pub operation: ImportOperation,
    pub status: ImportStatus,
    pub records_processed: i64,
    pub error_message: String,
    pub created_at: i64,
    pub updated_at: i64,
}
