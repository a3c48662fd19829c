//! Domain model shared by the PCD-01 codec: observations, values, configuration and errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Code system used when the caller does not name one.
pub const DEFAULT_CODE_SYSTEM: &str = "MDC";

/// Knobs for converting query results into observations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConverterConfig {
    /// Coding system attached to codes that arrive without one (summary names).
    pub default_code_system: String,
    /// Text used when the harmonized table has no description for a trend code.
    pub missing_description: String,
    /// Text used when the harmonized table has no description for a summary name.
    pub missing_name_description: String,
    /// Prefix prepended to a patient id to build the subject reference.
    pub patient_reference_prefix: String,
    /// Prefix prepended to a device id to build the performer reference.
    pub device_reference_prefix: String,
    /// What to do with points that share an identical timestamp.
    pub duplicate_timestamps: DuplicateTimestamps,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            default_code_system: DEFAULT_CODE_SYSTEM.to_string(),
            missing_description: "Description of the code not available".to_string(),
            missing_name_description: "Description of the name not available".to_string(),
            patient_reference_prefix: "Patient/".to_string(),
            device_reference_prefix: "Device/".to_string(),
            duplicate_timestamps: DuplicateTimestamps::KeepLast,
        }
    }
}

/// Policy for trend points whose timestamps collide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateTimestamps {
    /// Keep only the last point seen for a timestamp; earlier ones are dropped with a warning.
    #[default]
    KeepLast,
    /// Keep every point, ordering equal timestamps by arrival.
    KeepAll,
}

/// A coded concept: coding system, code and its human readable description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coding {
    pub system: String,
    pub code: String,
    pub description: String,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Sampled data carried by a waveform observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waveform {
    /// Sample tokens in source order, kept verbatim.
    pub samples: Vec<String>,
    /// Milliseconds between two samples, present only for a positive sample rate.
    pub period_millis: Option<f64>,
    /// Unit code of the samples as reported by the device.
    pub origin_unit: String,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
}

impl Waveform {
    /// Samples joined by single spaces.
    pub fn data(&self) -> String {
        self.samples.join(" ")
    }

    /// Sample rate in Hz derived back from the period.
    pub fn sample_rate(&self) -> Option<f64> {
        self.period_millis.map(|period| 1000.0 / period)
    }
}

/// The three mutually exclusive value encodings of an observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Value {
    Scalar { value: f64, unit: String },
    Waveform(Waveform),
    Text { text: String },
}

impl Value {
    /// Unit code attached to the value, if the encoding carries one.
    pub fn unit(&self) -> Option<&str> {
        match self {
            Value::Scalar { unit, .. } => Some(unit),
            Value::Waveform(waveform) => Some(&waveform.origin_unit),
            Value::Text { .. } => None,
        }
    }
}

/// Normalized record of one measurement.
///
/// Summary stubs produced from name lists carry neither `effective_time` nor `value`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub id: String,
    pub subject: Option<String>,
    pub performer: Option<String>,
    pub code: Coding,
    pub effective_time: Option<DateTime<Utc>>,
    pub value: Option<Value>,
}

impl Observation {
    pub fn new(id: impl Into<String>, code: Coding) -> Self {
        Self {
            id: id.into(),
            subject: None,
            performer: None,
            code,
            effective_time: None,
            value: None,
        }
    }

    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_performer(mut self, performer: Option<String>) -> Self {
        self.performer = performer;
        self
    }

    pub fn with_effective_time(mut self, effective_time: DateTime<Utc>) -> Self {
        self.effective_time = Some(effective_time);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Minimal patient entry from a patient summary query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientSummary {
    pub id: String,
    pub identifier: String,
}

impl PatientSummary {
    pub fn new(pid: impl Into<String>) -> Self {
        let pid = pid.into();
        Self {
            id: pid.clone(),
            identifier: pid,
        }
    }
}

/// Which trend a query result belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendQuery {
    pub patient_id: Option<String>,
    pub device_id: Option<String>,
    pub code: String,
    pub code_system: String,
}

impl TrendQuery {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            patient_id: None,
            device_id: None,
            code: code.into(),
            code_system: DEFAULT_CODE_SYSTEM.to_string(),
        }
    }

    pub fn for_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn for_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn subject_reference(&self, config: &ConverterConfig) -> Option<String> {
        self.patient_id
            .as_ref()
            .map(|id| format!("{}{id}", config.patient_reference_prefix))
    }

    pub fn performer_reference(&self, config: &ConverterConfig) -> Option<String> {
        self.device_id
            .as_ref()
            .map(|id| format!("{}{id}", config.device_reference_prefix))
    }
}

pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Database collaborator that executes queries and stores documents.
pub trait QueryBackend {
    /// Execute a query and return the raw response text.
    fn run(&self, query: &str) -> Result<String, BackendError>;

    /// Store a document under `uri` and return the backend acknowledgement.
    fn insert(&self, uri: &str, document: &str) -> Result<String, BackendError>;
}

/// Errors raised while converting between observations and wire documents.
#[derive(Debug, thiserror::Error)]
pub enum PcdError {
    #[error("input is missing required data")]
    MissingData,
    #[error("malformed XML document: {0}")]
    Xml(String),
    #[error("missing attribute {0}")]
    MissingAttribute(&'static str),
    #[error("unable to parse value: {0}")]
    InvalidValue(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("failed to load terminology tables: {0}")]
    RosettaInitialization(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

pub type PcdResult<T> = std::result::Result<T, PcdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_query_builds_references_from_ids() {
        let config = ConverterConfig::default();
        let query = TrendQuery::new("MDC_RESP_RATE")
            .for_patient("1912-121212")
            .for_device("dev-1");

        assert_eq!(
            query.subject_reference(&config).as_deref(),
            Some("Patient/1912-121212")
        );
        assert_eq!(
            query.performer_reference(&config).as_deref(),
            Some("Device/dev-1")
        );
    }

    #[test]
    fn references_are_absent_without_ids() {
        let query = TrendQuery::new("MDC_RESP_RATE");
        let config = ConverterConfig::default();
        assert_eq!(query.subject_reference(&config), None);
        assert_eq!(query.performer_reference(&config), None);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: ConverterConfig =
            serde_json::from_str(r#"{"duplicate_timestamps":"keep_all"}"#).unwrap();
        assert_eq!(config.duplicate_timestamps, DuplicateTimestamps::KeepAll);
        assert_eq!(config.default_code_system, "MDC");
        assert_eq!(
            config.missing_name_description,
            "Description of the name not available"
        );
    }

    #[test]
    fn waveform_exposes_space_joined_data_and_rate() {
        let waveform = Waveform {
            samples: vec!["0.0".into(), "0.1".into()],
            period_millis: Some(250.0),
            origin_unit: "MDC_DIM_MILLI_VOLT".into(),
            lower_limit: None,
            upper_limit: None,
        };
        assert_eq!(waveform.data(), "0.0 0.1");
        assert_eq!(waveform.sample_rate(), Some(4.0));
    }

    #[test]
    fn patient_summary_reuses_pid() {
        let patient = PatientSummary::new("010101-2425");
        assert_eq!(patient.id, "010101-2425");
        assert_eq!(patient.identifier, "010101-2425");
    }
}
