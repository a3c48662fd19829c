//! Value grammar of point results.
//!
//! Classification is purely syntactic and ordered: a decimal literal is a scalar,
//! otherwise an `NA` prefix is a waveform (`NA[v1^v2^...]`), otherwise text.
//! Waveform ranges use `NR[low^high]`.

use pcd_core::{PcdError, PcdResult, Value, Waveform};

pub const TYPE_NUMERIC: &str = "NM";
pub const TYPE_NUMERIC_ARRAY: &str = "NA";
pub const TYPE_STRING: &str = "ST";

const ARRAY_PREFIX: &str = "NA";
const ARRAY_OPEN: &str = "NA[";
const RANGE_OPEN: &str = "NR[";
const SEPARATOR: char = '^';

/// Interpret a raw point value. `harmonized_unit` wins over `unit` for scalars when non-blank.
pub fn parse_value(
    value: &str,
    sample_rate: &str,
    unit: &str,
    data_range: &str,
    harmonized_unit: &str,
) -> PcdResult<Value> {
    if let Some(number) = parse_decimal(value) {
        let unit = if harmonized_unit.trim().is_empty() {
            unit
        } else {
            harmonized_unit
        };
        return Ok(Value::Scalar {
            value: number,
            unit: unit.to_string(),
        });
    }

    if value.starts_with(ARRAY_PREFIX) {
        return parse_waveform(value, sample_rate, unit, data_range).map(Value::Waveform);
    }

    Ok(Value::Text {
        text: value.to_string(),
    })
}

/// Text and HL7 v2 type tag for a value.
pub fn format_value(value: &Value) -> (String, &'static str) {
    match value {
        Value::Scalar { value, .. } => (format_decimal(*value), TYPE_NUMERIC),
        Value::Waveform(waveform) => (
            format!("{ARRAY_OPEN}{}]", waveform.samples.join("^")),
            TYPE_NUMERIC_ARRAY,
        ),
        Value::Text { text } => (text.clone(), TYPE_STRING),
    }
}

/// `NR[low^high]`, or `None` when the waveform has no range.
pub fn format_range(waveform: &Waveform) -> Option<String> {
    match (waveform.lower_limit, waveform.upper_limit) {
        (Some(low), Some(high)) => Some(format!(
            "{RANGE_OPEN}{}^{}]",
            format_decimal(low),
            format_decimal(high)
        )),
        _ => None,
    }
}

pub fn format_sample_rate(waveform: &Waveform) -> Option<String> {
    waveform.sample_rate().map(format_decimal)
}

/// Plain decimal notation, never exponent form.
pub fn format_decimal(value: f64) -> String {
    format!("{value}")
}

fn parse_decimal(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|number| number.is_finite())
}

fn parse_waveform(
    value: &str,
    sample_rate: &str,
    unit: &str,
    data_range: &str,
) -> PcdResult<Waveform> {
    let inner = value
        .strip_prefix(ARRAY_OPEN)
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| PcdError::InvalidValue(format!("unable to parse numeric array {value}")))?;

    let samples = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(SEPARATOR).map(str::to_string).collect()
    };

    let (lower_limit, upper_limit) = match parse_range(data_range)? {
        Some((low, high)) => (Some(low), Some(high)),
        None => (None, None),
    };

    Ok(Waveform {
        samples,
        period_millis: sample_rate_to_period(sample_rate),
        origin_unit: unit.to_string(),
        lower_limit,
        upper_limit,
    })
}

/// Blank ranges are absent; anything else must be `NR[low^high]` with two numbers.
pub fn parse_range(data_range: &str) -> PcdResult<Option<(f64, f64)>> {
    if data_range.trim().is_empty() {
        return Ok(None);
    }

    let inner = data_range
        .strip_prefix(RANGE_OPEN)
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| PcdError::InvalidValue(format!("unable to parse data range {data_range}")))?;

    let bounds: Vec<&str> = inner.split(SEPARATOR).collect();
    if bounds.len() != 2 {
        return Err(PcdError::InvalidValue(format!(
            "data range contains {} values, should contain 2",
            bounds.len()
        )));
    }

    let low = parse_decimal(bounds[0])
        .ok_or_else(|| PcdError::InvalidValue(format!("invalid lower limit {}", bounds[0])))?;
    let high = parse_decimal(bounds[1])
        .ok_or_else(|| PcdError::InvalidValue(format!("invalid upper limit {}", bounds[1])))?;

    Ok(Some((low, high)))
}

/// Milliseconds between samples; only a numeric, strictly positive rate yields a period.
pub fn sample_rate_to_period(sample_rate: &str) -> Option<f64> {
    parse_decimal(sample_rate)
        .filter(|rate| *rate > 0.0)
        .map(|rate| 1000.0 / rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_strings_are_scalars() {
        for raw in ["40.5", "-3", "0", "1e3", " 12.25 "] {
            let value = parse_value(raw, "", "MDC_DIM_RESP_PER_MIN", "", "").unwrap();
            let expected: f64 = raw.trim().parse().unwrap();
            assert_eq!(
                value,
                Value::Scalar {
                    value: expected,
                    unit: "MDC_DIM_RESP_PER_MIN".to_string()
                }
            );
        }
    }

    #[test]
    fn harmonized_unit_wins_when_present() {
        let value = parse_value("44.2", "", "MDC_DIM_RESP_PER_MIN", "", "/min").unwrap();
        assert_eq!(value.unit(), Some("/min"));

        let value = parse_value("44.2", "", "MDC_DIM_RESP_PER_MIN", "", "  ").unwrap();
        assert_eq!(value.unit(), Some("MDC_DIM_RESP_PER_MIN"));
    }

    #[test]
    fn waveform_keeps_samples_period_unit_and_range() {
        let value = parse_value(
            "NA[0.0^0.1^0.2^0.3]",
            "4",
            "MDC_DIM_MILLI_VOLT",
            "NR[0^1]",
            "mV",
        )
        .unwrap();

        let Value::Waveform(waveform) = value else {
            panic!("expected waveform");
        };
        assert_eq!(waveform.data(), "0.0 0.1 0.2 0.3");
        assert_eq!(waveform.period_millis, Some(250.0));
        assert_eq!(waveform.origin_unit, "MDC_DIM_MILLI_VOLT");
        assert_eq!(waveform.lower_limit, Some(0.0));
        assert_eq!(waveform.upper_limit, Some(1.0));
    }

    #[test]
    fn na_prefix_without_brackets_is_a_parse_error() {
        assert!(matches!(
            parse_value("NA0.1^0.2", "", "", "", ""),
            Err(PcdError::InvalidValue(_))
        ));
        assert!(matches!(
            parse_value("NA[0.1^0.2", "", "", "", ""),
            Err(PcdError::InvalidValue(_))
        ));
    }

    #[test]
    fn anything_else_is_text() {
        for raw in ["NaN", "high", "", "nr[0^1]", "inf", "1e400"] {
            assert_eq!(
                parse_value(raw, "", "", "", "").unwrap(),
                Value::Text {
                    text: raw.to_string()
                }
            );
        }
    }

    #[test]
    fn range_needs_exactly_two_numeric_tokens() {
        assert_eq!(parse_range("NR[0^1]").unwrap(), Some((0.0, 1.0)));
        assert_eq!(parse_range("").unwrap(), None);
        assert!(parse_range("NR[0^1^2]").is_err());
        assert!(parse_range("NR[0]").is_err());
        assert!(parse_range("NR[low^1]").is_err());
        assert!(parse_range("[0^1]").is_err());
        assert!(parse_value("NA[1^2]", "", "", "NR[0^1^2]", "").is_err());
    }

    #[test]
    fn bad_sample_rates_omit_the_period() {
        assert_eq!(sample_rate_to_period("4"), Some(250.0));
        assert_eq!(sample_rate_to_period("0"), None);
        assert_eq!(sample_rate_to_period("-4"), None);
        assert_eq!(sample_rate_to_period(""), None);
        assert_eq!(sample_rate_to_period("fast"), None);
    }

    #[test]
    fn formatting_preserves_the_payload() {
        let original = parse_value(
            "NA[0.0^0.1^0.2^0.3]",
            "4",
            "MDC_DIM_MILLI_VOLT",
            "NR[0^1]",
            "",
        )
        .unwrap();
        let Value::Waveform(waveform) = &original else {
            panic!("expected waveform");
        };

        let (text, tag) = format_value(&original);
        assert_eq!(tag, TYPE_NUMERIC_ARRAY);
        let range = format_range(waveform).unwrap();
        let rate = format_sample_rate(waveform).unwrap();
        assert_eq!(range, "NR[0^1]");
        assert_eq!(rate, "4");

        let reparsed = parse_value(&text, &rate, &waveform.origin_unit, &range, "").unwrap();
        assert_eq!(reparsed, original);

        assert_eq!(
            format_value(&Value::Scalar {
                value: 1337.42,
                unit: String::new()
            }),
            ("1337.42".to_string(), TYPE_NUMERIC)
        );
        assert_eq!(
            format_value(&Value::Text {
                text: "artifact".into()
            }),
            ("artifact".to_string(), TYPE_STRING)
        );
    }
}
