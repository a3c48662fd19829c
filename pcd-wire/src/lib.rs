//! PCD-01 (T5 XML) to observation converter, and back, with Rosetta terminology harmonization.

pub mod parser;
pub mod rosetta;
pub mod serializer;
pub mod time;
pub mod value;
pub mod xml;

use pcd_core::{
    ConverterConfig, Observation, PatientSummary, PcdError, PcdResult, QueryBackend, TrendQuery,
};
use tracing::debug;
use uuid::Uuid;

pub use parser::{PointEntry, RejectedPoint, TrendBatch, WireParser};
pub use rosetta::Rosetta;
pub use serializer::{serialize_observation, serialize_with_header, MessageHeader};
pub use xml::Element;

/// Random identifier for messages and observations without an upstream id.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Convert a `<trend>` query result from its text form.
pub fn convert_trend_str(
    response: &str,
    query: &TrendQuery,
    rosetta: &Rosetta,
    config: &ConverterConfig,
) -> PcdResult<TrendBatch> {
    let document = Element::parse(response)?;
    Ok(convert_trend_document(&document, query, rosetta, config))
}

pub fn convert_trend_document(
    document: &Element,
    query: &TrendQuery,
    rosetta: &Rosetta,
    config: &ConverterConfig,
) -> TrendBatch {
    WireParser::new(rosetta, config).convert_trend(document, query)
}

/// Convert an `<ObsName>` list into code-only observation stubs.
pub fn convert_observation_summary_str(
    response: &str,
    rosetta: &Rosetta,
    config: &ConverterConfig,
) -> PcdResult<Vec<Observation>> {
    let document = Element::parse(response)?;
    Ok(WireParser::new(rosetta, config).convert_observation_summary(&document))
}

/// Convert a `<PID>` list into patient entries.
pub fn convert_patient_summary_str(response: &str) -> PcdResult<Vec<PatientSummary>> {
    let document = Element::parse(response)?;
    Ok(parser::convert_patient_summary(&document))
}

/// Serialize one observation to PCD-01 message text.
pub fn observation_to_xml_string(
    observation: &Observation,
    rosetta: &Rosetta,
) -> PcdResult<String> {
    serialize_observation(observation, rosetta)?.to_xml_string()
}

/// Run an already assembled trend query and convert its response.
pub fn fetch_trend<B>(
    backend: &B,
    query_text: &str,
    trend: &TrendQuery,
    rosetta: &Rosetta,
    config: &ConverterConfig,
) -> PcdResult<TrendBatch>
where
    B: QueryBackend + ?Sized,
{
    let response = backend
        .run(query_text)
        .map_err(|err| PcdError::BackendUnavailable(err.to_string()))?;
    debug!(code = %trend.code, bytes = response.len(), "received trend response");
    convert_trend_str(&response, trend, rosetta, config)
}

/// Serialize an observation and store it under `uri`, returning the backend acknowledgement.
pub fn store_observation<B>(
    backend: &B,
    uri: &str,
    observation: &Observation,
    rosetta: &Rosetta,
) -> PcdResult<String>
where
    B: QueryBackend + ?Sized,
{
    let document = observation_to_xml_string(observation, rosetta)?;
    backend
        .insert(uri, &document)
        .map_err(|err| PcdError::BackendUnavailable(err.to_string()))
}
