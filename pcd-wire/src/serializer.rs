//! One observation to a PCD-01 message.
//!
//! Messages carry a single channel with a single metric, so every `index` is
//! `"1"` and the observation hierarchy is always `"1.1.1.1"`.

use chrono::{DateTime, Utc};
use pcd_core::{Observation, PcdError, PcdResult, Value};

use crate::generate_id;
use crate::rosetta::Rosetta;
use crate::time::to_storage_format;
use crate::value::format_value;
use crate::xml::Element;

pub const ELEMENT_PCD_01_MESSAGE: &str = "PCD_01_Message";
pub const ELEMENT_SENDING_APPLICATION: &str = "Sending_Application";
pub const ELEMENT_SENDING_FACILITY: &str = "Sending_Facility";
pub const ELEMENT_PATIENT_RESULT: &str = "Patient_Result";
pub const ELEMENT_PATIENT: &str = "Patient";
pub const ELEMENT_IDENTIFIER: &str = "Identifier";
pub const ELEMENT_ORDER_OBSERVATIONS: &str = "Order_Observations";
pub const ELEMENT_ORDER: &str = "Order";
pub const ELEMENT_FILLER_ORDER_NUMBER: &str = "FillerOrderNumber";
pub const ELEMENT_UNIVERSAL_SERVICE_ID: &str = "UniversalServiceID";
pub const ELEMENT_MDS: &str = "MDS";
pub const ELEMENT_VMD: &str = "VMD";
pub const ELEMENT_CHAN: &str = "CHAN";
pub const ELEMENT_METRIC: &str = "Metric";
pub const ELEMENT_OBSERVATION: &str = "Observation";
pub const ELEMENT_OBS_IDENTIFIER: &str = "ObsIdentifier";
pub const ELEMENT_VALUE: &str = "Value";
pub const ELEMENT_UNIT: &str = "Unit";
pub const ELEMENT_TIMESTAMP: &str = "Timestamp";

const ATTRIBUTE_ID: &str = "id";
const ATTRIBUTE_TIME_STAMP: &str = "timeStamp";
const ATTRIBUTE_ID_LOCAL: &str = "idLocal";
const ATTRIBUTE_ID_UNIVERSAL: &str = "idUniversal";
const ATTRIBUTE_ID_UNIVERSAL_TYPE: &str = "idUniversalType";
const ATTRIBUTE_CODING_SYSTEM_NAME: &str = "codingSystemName";
const ATTRIBUTE_INDEX: &str = "index";
const ATTRIBUTE_HIERARCHY: &str = "hierarchy";
const ATTRIBUTE_UID: &str = "uid";
const ATTRIBUTE_TYPE_HL7V2: &str = "typeHL7V2";

/// Index of the only MDS, VMD, channel, metric and observation in a message.
pub const SINGLE_CHANNEL_INDEX: &str = "1";
/// Hierarchy of the only observation in a message.
pub const SINGLE_CHANNEL_HIERARCHY: &str = "1.1.1.1";

/// Every message is filed under the same service.
pub const UNIVERSAL_SERVICE_CODING_SYSTEM: &str = "T5";
pub const UNIVERSAL_SERVICE_ID: &str = "mobile monitoring";

/// Message id and creation time stamped on the root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageHeader {
    pub fn fresh() -> Self {
        Self {
            id: generate_id(),
            timestamp: Utc::now(),
        }
    }
}

pub fn serialize_observation(observation: &Observation, rosetta: &Rosetta) -> PcdResult<Element> {
    serialize_with_header(observation, rosetta, &MessageHeader::fresh())
}

/// Same as [`serialize_observation`] with a caller-chosen message id and time.
pub fn serialize_with_header(
    observation: &Observation,
    rosetta: &Rosetta,
    header: &MessageHeader,
) -> PcdResult<Element> {
    let effective_time = observation.effective_time.ok_or(PcdError::MissingData)?;
    let value = observation.value.as_ref().ok_or(PcdError::MissingData)?;
    let formatted_time = to_storage_format(&effective_time);

    Ok(Element::new(ELEMENT_PCD_01_MESSAGE)
        .with_attribute(ATTRIBUTE_ID, header.id.as_str())
        .with_attribute(ATTRIBUTE_TIME_STAMP, to_storage_format(&header.timestamp))
        .with_child(sending_placeholder(ELEMENT_SENDING_APPLICATION))
        .with_child(sending_placeholder(ELEMENT_SENDING_FACILITY))
        .with_child(
            Element::new(ELEMENT_PATIENT_RESULT)
                .with_child(patient_element(observation))
                .with_child(
                    Element::new(ELEMENT_ORDER_OBSERVATIONS)
                        .with_child(order_element(&formatted_time))
                        .with_child(mds_element(observation_element(
                            observation,
                            value,
                            &formatted_time,
                            rosetta,
                        ))),
                ),
        ))
}

fn sending_placeholder(name: &str) -> Element {
    Element::new(name)
        .with_attribute(ATTRIBUTE_ID_LOCAL, "")
        .with_attribute(ATTRIBUTE_ID_UNIVERSAL, "")
        .with_attribute(ATTRIBUTE_ID_UNIVERSAL_TYPE, "")
}

fn patient_element(observation: &Observation) -> Element {
    let subject = observation.subject.as_deref().unwrap_or_default();
    Element::new(ELEMENT_PATIENT).with_child(Element::new(ELEMENT_IDENTIFIER).with_text(subject))
}

fn order_element(formatted_time: &str) -> Element {
    Element::new(ELEMENT_ORDER)
        .with_attribute(ATTRIBUTE_TIME_STAMP, formatted_time)
        .with_child(Element::new(ELEMENT_FILLER_ORDER_NUMBER))
        .with_child(
            Element::new(ELEMENT_UNIVERSAL_SERVICE_ID)
                .with_attribute(ATTRIBUTE_CODING_SYSTEM_NAME, UNIVERSAL_SERVICE_CODING_SYSTEM)
                .with_text(UNIVERSAL_SERVICE_ID),
        )
}

fn mds_element(observation: Element) -> Element {
    let indexed =
        |name: &str| Element::new(name).with_attribute(ATTRIBUTE_INDEX, SINGLE_CHANNEL_INDEX);

    indexed(ELEMENT_MDS).with_child(
        indexed(ELEMENT_VMD).with_child(
            indexed(ELEMENT_CHAN).with_child(indexed(ELEMENT_METRIC).with_child(observation)),
        ),
    )
}

fn observation_element(
    observation: &Observation,
    value: &Value,
    formatted_time: &str,
    rosetta: &Rosetta,
) -> Element {
    let system = observation.code.system.as_str();
    let (value_text, type_tag) = format_value(value);

    Element::new(ELEMENT_OBSERVATION)
        .with_attribute(ATTRIBUTE_HIERARCHY, SINGLE_CHANNEL_HIERARCHY)
        .with_attribute(ATTRIBUTE_INDEX, SINGLE_CHANNEL_INDEX)
        .with_attribute(ATTRIBUTE_UID, observation.id.as_str())
        .with_child(
            Element::new(ELEMENT_OBS_IDENTIFIER)
                .with_attribute(ATTRIBUTE_CODING_SYSTEM_NAME, system)
                .with_text(observation.code.code.as_str()),
        )
        .with_child(
            Element::new(ELEMENT_VALUE)
                .with_attribute(ATTRIBUTE_TYPE_HL7V2, type_tag)
                .with_text(value_text),
        )
        .with_child(
            Element::new(ELEMENT_UNIT)
                .with_attribute(ATTRIBUTE_CODING_SYSTEM_NAME, system)
                .with_text(unit_code(observation, value, rosetta)),
        )
        .with_child(Element::new(ELEMENT_TIMESTAMP).with_text(formatted_time))
}

/// A blank unit falls back to the harmonized unit of the code; text values carry none.
fn unit_code<'a>(observation: &'a Observation, value: &'a Value, rosetta: &'a Rosetta) -> &'a str {
    match value.unit() {
        Some(unit) if !unit.trim().is_empty() => unit,
        Some(_) => rosetta.ucum_unit(&observation.code.code),
        None => "",
    }
}
