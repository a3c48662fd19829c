//! Query results (`<trend>`, `<ObsName>`, `<PID>`) to observations and patients.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pcd_core::{
    Coding, ConverterConfig, DuplicateTimestamps, Observation, PatientSummary, PcdError,
    PcdResult, TrendQuery,
};
use tracing::{debug, warn};

use crate::generate_id;
use crate::rosetta::Rosetta;
use crate::time::parse_xml_datetime;
use crate::value::parse_value;
use crate::xml::Element;

/// Attributes of one `<point>` result entry; absent attributes are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointEntry {
    pub uid: String,
    pub time: String,
    pub value: String,
    pub sample_rate: String,
    pub unit: String,
    pub data_range: String,
}

impl PointEntry {
    pub fn from_element(element: &Element) -> Self {
        Self {
            uid: element.attribute_or_empty("uid").to_string(),
            time: element.attribute_or_empty("time").to_string(),
            value: element.attribute_or_empty("value").to_string(),
            sample_rate: element.attribute_or_empty("sampleRate").to_string(),
            unit: element.attribute_or_empty("unit").to_string(),
            data_range: element.attribute_or_empty("dataRange").to_string(),
        }
    }

    fn timestamp(&self) -> PcdResult<DateTime<Utc>> {
        if self.time.trim().is_empty() {
            return Err(PcdError::MissingAttribute("time"));
        }
        parse_xml_datetime(&self.time)
    }
}

/// A point that could not be converted, with the reason.
#[derive(Debug)]
pub struct RejectedPoint {
    pub uid: String,
    pub time: String,
    pub error: PcdError,
}

impl RejectedPoint {
    fn new(point: &PointEntry, error: PcdError) -> Self {
        warn!(uid = %point.uid, time = %point.time, %error, "rejecting trend point");
        Self {
            uid: point.uid.clone(),
            time: point.time.clone(),
            error,
        }
    }
}

/// Observations of one trend, ascending by time, plus the points that failed to convert.
#[derive(Debug, Default)]
pub struct TrendBatch {
    pub observations: Vec<Observation>,
    pub rejected: Vec<RejectedPoint>,
}

pub struct WireParser<'a> {
    rosetta: &'a Rosetta,
    config: &'a ConverterConfig,
}

impl<'a> WireParser<'a> {
    pub fn new(rosetta: &'a Rosetta, config: &'a ConverterConfig) -> Self {
        Self { rosetta, config }
    }

    /// Code with its harmonized description, or `placeholder` when none is known.
    pub fn harmonized_code(&self, system: &str, code: &str, placeholder: &str) -> Coding {
        let description = match self.rosetta.description(code) {
            "" => placeholder,
            found => found,
        };
        Coding::new(system, code).with_description(description)
    }

    /// Convert every `<point>` of a trend document.
    pub fn convert_trend(&self, document: &Element, query: &TrendQuery) -> TrendBatch {
        let points: Vec<PointEntry> = document
            .descendants("point")
            .into_iter()
            .map(PointEntry::from_element)
            .collect();

        let code = self.harmonized_code(
            &query.code_system,
            &query.code,
            &self.config.missing_description,
        );
        let harmonized_unit = self.rosetta.ucum_unit(&query.code);
        if harmonized_unit.is_empty() {
            debug!(code = %query.code, "no harmonized unit, keeping point units");
        }

        let subject = query.subject_reference(self.config);
        let performer = query.performer_reference(self.config);

        self.parse_points(
            &points,
            subject.as_deref(),
            performer.as_deref(),
            &code,
            harmonized_unit,
        )
    }

    /// Converts every point, then applies the duplicate policy to the points that converted.
    pub fn parse_points(
        &self,
        points: &[PointEntry],
        subject: Option<&str>,
        performer: Option<&str>,
        code: &Coding,
        harmonized_unit: &str,
    ) -> TrendBatch {
        let mut batch = TrendBatch::default();
        let mut converted: Vec<(DateTime<Utc>, Observation)> = Vec::with_capacity(points.len());

        for point in points {
            match self.convert_point(point, subject, performer, code, harmonized_unit) {
                Ok(entry) => converted.push(entry),
                Err(error) => batch.rejected.push(RejectedPoint::new(point, error)),
            }
        }

        batch.observations = match self.config.duplicate_timestamps {
            DuplicateTimestamps::KeepLast => {
                let mut by_time: BTreeMap<DateTime<Utc>, Observation> = BTreeMap::new();
                for (timestamp, observation) in converted {
                    if let Some(dropped) = by_time.insert(timestamp, observation) {
                        warn!(
                            uid = %dropped.id,
                            time = %timestamp,
                            "dropping trend point with duplicate timestamp"
                        );
                    }
                }
                by_time.into_values().collect()
            }
            DuplicateTimestamps::KeepAll => {
                converted.sort_by_key(|(timestamp, _)| *timestamp);
                converted
                    .into_iter()
                    .map(|(_, observation)| observation)
                    .collect()
            }
        };

        debug!(
            observations = batch.observations.len(),
            rejected = batch.rejected.len(),
            "converted trend points"
        );

        batch
    }

    fn convert_point(
        &self,
        point: &PointEntry,
        subject: Option<&str>,
        performer: Option<&str>,
        code: &Coding,
        harmonized_unit: &str,
    ) -> PcdResult<(DateTime<Utc>, Observation)> {
        let timestamp = point.timestamp()?;
        let value = parse_value(
            &point.value,
            &point.sample_rate,
            &point.unit,
            &point.data_range,
            harmonized_unit,
        )?;

        let id = if point.uid.trim().is_empty() {
            generate_id()
        } else {
            point.uid.clone()
        };

        let observation = Observation::new(id, code.clone())
            .with_subject(subject.map(str::to_string))
            .with_performer(performer.map(str::to_string))
            .with_effective_time(timestamp)
            .with_value(value);

        Ok((timestamp, observation))
    }

    /// Every `<ObsName>` of a summary document as a code-only stub.
    pub fn convert_observation_summary(&self, document: &Element) -> Vec<Observation> {
        let names: Vec<String> = document
            .descendants("ObsName")
            .into_iter()
            .map(Element::text_content)
            .collect();
        self.parse_summary_names(&names)
    }

    pub fn parse_summary_names(&self, names: &[String]) -> Vec<Observation> {
        names
            .iter()
            .map(|name| {
                let code = self.harmonized_code(
                    &self.config.default_code_system,
                    name,
                    &self.config.missing_name_description,
                );
                Observation::new(generate_id(), code)
            })
            .collect()
    }
}

/// Every `<PID>` of a patient summary document.
pub fn convert_patient_summary(document: &Element) -> Vec<PatientSummary> {
    let ids: Vec<String> = document
        .descendants("PID")
        .into_iter()
        .map(Element::text_content)
        .collect();
    parse_summary_ids(&ids)
}

pub fn parse_summary_ids(ids: &[String]) -> Vec<PatientSummary> {
    ids.iter().map(PatientSummary::new).collect()
}
