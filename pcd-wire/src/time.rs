//! Timestamp formats used on the wire.
//!
//! Storage and query strings are UTC without an offset designator
//! (`2015-03-26T16:32:43.000`). HL7 device strings use `yyyyMMddHHmmss.SSS`
//! followed by an optional offset; a missing offset means UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SubsecRound, TimeZone, Utc};
use pcd_core::{PcdError, PcdResult};

pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
pub const DEVICE_FORMAT: &str = "%Y%m%d%H%M%S%.3f";

const DEVICE_FORMAT_WITH_OFFSET: &str = "%Y%m%d%H%M%S%.3f%#z";
const XML_DATETIME_NO_ZONE: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub fn to_storage_format(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(STORAGE_FORMAT).to_string()
}

/// Device format with an explicit numeric offset, e.g. `20150818130436.710+0000`.
pub fn to_device_format<Tz>(timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    timestamp.format("%Y%m%d%H%M%S%.3f%z").to_string()
}

pub fn parse_storage_format(value: &str) -> PcdResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), STORAGE_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|err| PcdError::InvalidTimestamp(format!("{value}: {err}")))
}

pub fn parse_device_format(value: &str) -> PcdResult<DateTime<Utc>> {
    let value = value.trim();
    let invalid = |err: chrono::ParseError| PcdError::InvalidTimestamp(format!("{value}: {err}"));

    if !includes_time_zone(value) {
        return NaiveDateTime::parse_from_str(value, DEVICE_FORMAT)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(invalid);
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, DEVICE_FORMAT)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(invalid);
    }

    DateTime::<FixedOffset>::parse_from_str(value, DEVICE_FORMAT_WITH_OFFSET)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(invalid)
}

/// Parse an XML Schema `dateTime`; a value without zone is taken as UTC.
///
/// Digits below the millisecond are truncated.
pub fn parse_xml_datetime(value: &str) -> PcdResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc).trunc_subsecs(3));
    }

    NaiveDateTime::parse_from_str(value, XML_DATETIME_NO_ZONE)
        .map(|naive| Utc.from_utc_datetime(&naive).trunc_subsecs(3))
        .map_err(|err| PcdError::InvalidTimestamp(format!("{value}: {err}")))
}

fn includes_time_zone(value: &str) -> bool {
    value.contains('+') || value.contains('-') || value.contains('Z')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_offset_utc_and_zero_offset_are_the_same_instant() {
        let bare = parse_device_format("20150818130436.710").unwrap();
        let zulu = parse_device_format("20150818130436.710Z").unwrap();
        let zero = parse_device_format("20150818130436.710+0000").unwrap();

        assert_eq!(bare, zulu);
        assert_eq!(bare, zero);
        assert_eq!(to_storage_format(&bare), "2015-08-18T13:04:36.710");
    }

    #[test]
    fn carried_offset_is_applied() {
        let bare = parse_device_format("20150818130436.710").unwrap();
        let plus_one = parse_device_format("20150818130436.710+0100").unwrap();

        assert_ne!(bare, plus_one);
        assert_eq!(bare - plus_one, chrono::Duration::hours(1));
    }

    #[test]
    fn device_format_renders_explicit_offset() {
        let instant = parse_device_format("20150818130436.710").unwrap();
        assert_eq!(to_device_format(&instant), "20150818130436.710+0000");
        assert_eq!(parse_device_format(&to_device_format(&instant)).unwrap(), instant);
    }

    #[test]
    fn xml_datetime_accepts_zulu_offsets_and_bare_values() {
        let zulu = parse_xml_datetime("2015-02-17T13:35:49.403Z").unwrap();
        let bare = parse_xml_datetime("2015-02-17T13:35:49.403").unwrap();
        let offset = parse_xml_datetime("2015-02-17T14:35:49.403+01:00").unwrap();

        assert_eq!(zulu, bare);
        assert_eq!(zulu, offset);
        assert_eq!(to_storage_format(&zulu), "2015-02-17T13:35:49.403");
        assert_eq!(parse_storage_format("2015-02-17T13:35:49.403").unwrap(), zulu);
    }

    #[test]
    fn xml_datetime_keeps_millisecond_precision() {
        let early = parse_xml_datetime("2015-02-17T13:35:49.4031Z").unwrap();
        let late = parse_xml_datetime("2015-02-17T13:35:49.4039Z").unwrap();
        let bare = parse_xml_datetime("2015-02-17T13:35:49.4039").unwrap();

        assert_eq!(early, late);
        assert_eq!(late, bare);
        assert_eq!(late, parse_xml_datetime("2015-02-17T13:35:49.403Z").unwrap());
    }

    #[test]
    fn garbage_is_an_invalid_timestamp() {
        assert!(matches!(
            parse_device_format("yesterday"),
            Err(PcdError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            parse_xml_datetime(""),
            Err(PcdError::InvalidTimestamp(_))
        ));
    }
}
