use habitat_core::error::HabitatError;
use serde_json::{Map, Value};

use crate::checksum::{crc16_ccitt, xor_checksum};
use crate::config::PayloadConfiguration;

/// Result of a successful crude parse: the parsed (or basic) document, plus
/// any per-descriptor errors that were silenced along the way (only
/// non-empty when every descriptor was tried and none matched).
pub struct ParseOutcome {
    pub value: Value,
    pub candidate_errors: Vec<String>,
}

/// Locates `$$`/`*`/`\n` as byte offsets and slices the raw bytes directly,
/// so a noisy non-UTF-8 byte elsewhere in the stream can't perturb where the
/// data/checksum boundaries land or what bytes the checksum is computed over.
fn split_bytes(buffer: &[u8]) -> Result<(&[u8], &[u8]), HabitatError> {
    if !buffer.starts_with(b"$$") {
        return Err(HabitatError::invalid_argument(
            "string does not begin with $$",
        ));
    }
    if buffer.last() != Some(&b'\n') {
        return Err(HabitatError::invalid_argument(
            "string does not end with '\\n'",
        ));
    }

    let star = buffer
        .iter()
        .rposition(|&b| b == b'*')
        .ok_or_else(|| HabitatError::invalid_argument("no checksum"))?;

    let check_start = star + 1;
    let check_end = buffer.len() - 1;
    if check_end < check_start {
        return Err(HabitatError::invalid_argument("invalid checksum length"));
    }
    let check_len = check_end - check_start;
    if check_len != 2 && check_len != 4 {
        return Err(HabitatError::invalid_argument("invalid checksum length"));
    }

    let data = &buffer[2..star];
    let checksum = &buffer[check_start..check_end];
    Ok((data, checksum))
}

/// Validates the checksum over the raw `data` bytes (never a lossily
/// re-encoded copy of them — that would compute over the wrong bytes
/// whenever the frame carries a non-UTF-8 noise byte).
fn examine_checksum(data: &[u8], checksum: &[u8]) -> Result<String, HabitatError> {
    if !checksum.iter().all(u8::is_ascii_hexdigit) {
        return Err(HabitatError::invalid_argument("invalid checksum encoding"));
    }
    // validated ascii hexdigit above, so this is always valid UTF-8.
    let checksum = std::str::from_utf8(checksum).unwrap().to_ascii_uppercase();

    let (expect, name) = match checksum.len() {
        2 => (xor_checksum(data), "xor"),
        4 => (crc16_ccitt(data), "crc16-ccitt"),
        _ => return Err(HabitatError::invalid_argument("invalid checksum length")),
    };

    if expect != checksum {
        return Err(HabitatError::invalid_argument(format!(
            "invalid checksum: expected {expect}"
        )));
    }

    Ok(name.to_string())
}

fn is_ddmm_field(field: &Value) -> bool {
    if field.get("sensor").and_then(Value::as_str) != Some("stdtelem.coordinate") {
        return false;
    }
    let Some(format) = field.get("format").and_then(Value::as_str) else {
        return false;
    };
    matches_ddmm_format(format)
}

/// Does `format` match `d+m+\.m+`?
fn matches_ddmm_format(format: &str) -> bool {
    let bytes = format.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos] == b'd' {
        pos += 1;
    }
    if pos == 0 || pos >= bytes.len() || bytes[pos] != b'm' {
        return false;
    }
    while pos < bytes.len() && bytes[pos] == b'm' {
        pos += 1;
    }
    if pos >= bytes.len() || bytes[pos] != b'.' {
        return false;
    }
    pos += 1;
    let rest = &bytes[pos..];
    !rest.is_empty() && rest.iter().all(|&b| b == b'm')
}

/// Convert a DDMM.MMMM-style coordinate string to decimal degrees. Output
/// precision is tied to the input's width.
fn convert_ddmm(value: &str) -> Result<String, HabitatError> {
    let dot = value
        .find('.')
        .ok_or_else(|| HabitatError::invalid_argument("invalid '.' pos when converting ddmm"))?;
    if dot <= 2 {
        return Err(HabitatError::invalid_argument(
            "invalid '.' pos when converting ddmm",
        ));
    }

    let left = &value[..dot - 2];
    let right = &value[dot - 2..];

    let left_val: f64 = left
        .parse()
        .map_err(|_| HabitatError::invalid_argument("couldn't parse left part (ddmm)"))?;
    let right_val: f64 = right
        .parse()
        .map_err(|_| HabitatError::invalid_argument("couldn't parse right part (ddmm)"))?;

    if !(0.0..60.0).contains(&right_val) {
        return Err(HabitatError::invalid_argument("invalid right part (ddmm)"));
    }

    let sign = if right_val.is_sign_negative() { -1.0 } else { 1.0 };
    let dd = left_val + sign * (right_val.abs() / 60.0);

    let leading_sign_len = usize::from(value.starts_with('+') || value.starts_with('-'));
    let precision = value.len().saturating_sub(leading_sign_len + 2);

    Ok(format!("{dd:.precision$}"))
}

fn extract_fields(
    data: &mut Map<String, Value>,
    fields: &[Value],
    parts: &[&str],
) -> Result<(), HabitatError> {
    for (field, part) in fields.iter().zip(parts.iter().skip(1)) {
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| HabitatError::protocol("invalid configuration (empty field name)"))?;
        if name.is_empty() {
            return Err(HabitatError::protocol(
                "invalid configuration (empty field name)",
            ));
        }

        if !part.is_empty() {
            let value = if is_ddmm_field(field) {
                convert_ddmm(part)?
            } else {
                part.to_string()
            };
            data.insert(name.to_string(), Value::String(value));
        }
    }
    Ok(())
}

fn check_callsign(cfg: Option<&PayloadConfiguration>, parts: &[&str]) -> Result<(), HabitatError> {
    if parts.first().is_none_or(|s| s.is_empty()) {
        return Err(HabitatError::invalid_argument("empty callsign"));
    }
    if let Some(callsign) = cfg.and_then(PayloadConfiguration::callsign) {
        if parts[0] != callsign {
            return Err(HabitatError::invalid_argument("incorrect callsign"));
        }
    }
    Ok(())
}

fn cook_basic(buffer: &str, callsign: &str) -> Value {
    let mut basic = Map::new();
    basic.insert("_sentence".to_string(), Value::String(buffer.to_string()));
    basic.insert("_protocol".to_string(), Value::String("UKHAS".to_string()));
    basic.insert("_parsed".to_string(), Value::Bool(true));
    basic.insert("payload".to_string(), Value::String(callsign.to_string()));
    Value::Object(basic)
}

fn attempt_descriptor(
    basic: &Value,
    descriptor: &Value,
    checksum_name: &str,
    parts: &[&str],
) -> Result<Value, HabitatError> {
    let fields = descriptor
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| HabitatError::invalid_argument("missing fields in sentence descriptor"))?;

    if descriptor.get("checksum").and_then(Value::as_str) != Some(checksum_name) {
        return Err(HabitatError::invalid_argument("wrong checksum type"));
    }
    if fields.len() != parts.len() - 1 {
        return Err(HabitatError::invalid_argument(
            "incorrect number of fields",
        ));
    }

    let mut data = basic
        .as_object()
        .cloned()
        .ok_or_else(|| HabitatError::protocol("basic document must be an object"))?;
    extract_fields(&mut data, fields, parts)?;
    Ok(Value::Object(data))
}

/// Validate the checksum and attempt to extract fields per the active
/// payload configuration. Structural failures (missing `$$`/`\n`/`*`, bad
/// checksum length or value, empty callsign) are returned as `Err`; a
/// configuration that exists but whose descriptors don't match the
/// sentence never fails outright — it falls back to the basic document with
/// `_basic: true`, and the per-descriptor errors are returned alongside for
/// the caller to log.
pub fn crude_parse(
    buffer: &[u8],
    cfg: Option<&PayloadConfiguration>,
) -> Result<ParseOutcome, HabitatError> {
    let (data_bytes, checksum_bytes) = split_bytes(buffer)?;
    let checksum_name = examine_checksum(data_bytes, checksum_bytes)?;

    let data = String::from_utf8_lossy(data_bytes);
    let parts: Vec<&str> = data.split(',').collect();
    check_callsign(cfg, &parts)?;

    let sentence = String::from_utf8_lossy(buffer);
    let basic = cook_basic(&sentence, parts[0]);

    let descriptors = cfg.map(PayloadConfiguration::descriptors).unwrap_or_default();
    let mut candidate_errors = Vec::new();

    for descriptor in &descriptors {
        match attempt_descriptor(&basic, descriptor, &checksum_name, &parts) {
            Ok(value) => {
                return Ok(ParseOutcome {
                    value,
                    candidate_errors: Vec::new(),
                });
            }
            Err(e) => candidate_errors.push(e.to_string()),
        }
    }

    let mut basic_map = basic.as_object().cloned().unwrap_or_default();
    basic_map.insert("_basic".to_string(), Value::Bool(true));

    Ok(ParseOutcome {
        value: Value::Object(basic_map),
        candidate_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn xor_checksum_round_trip() {
        let sentence = b"$$ABC,1,2*43\n";
        let outcome = crude_parse(sentence, None).unwrap();
        assert_eq!(outcome.value["payload"], "ABC");
        assert_eq!(outcome.value["_basic"], true);
    }

    #[test]
    fn bad_checksum_fails_structurally() {
        let sentence = b"$$ABC,1,2*FF\n";
        let err = crude_parse(sentence, None).unwrap_err();
        assert!(err.to_string().contains("invalid checksum"));
    }

    #[test]
    fn missing_dollar_fails() {
        let err = crude_parse(b"ABC,1,2*07\n", None).unwrap_err();
        assert!(err.to_string().contains("$$"));
    }

    #[test]
    fn parses_fields_against_matching_descriptor() {
        let cfg = PayloadConfiguration::from_value(json!({
            "payload": "ABC",
            "sentence": {
                "checksum": "xor",
                "fields": [{"name": "a"}, {"name": "b"}],
            },
        }));
        let sentence = b"$$ABC,1,2*43\n";
        let outcome = crude_parse(sentence, Some(&cfg)).unwrap();
        assert_eq!(outcome.value["a"], "1");
        assert_eq!(outcome.value["b"], "2");
        assert!(outcome.value.get("_basic").is_none());
    }

    #[test]
    fn wrong_callsign_rejected() {
        let cfg = PayloadConfiguration::from_value(json!({"payload": "XYZ"}));
        let err = crude_parse(b"$$ABC,1,2*43\n", Some(&cfg)).unwrap_err();
        assert!(err.to_string().contains("callsign"));
    }

    #[test]
    fn non_matching_descriptors_fall_back_to_basic() {
        let cfg = PayloadConfiguration::from_value(json!({
            "payload": "ABC",
            "sentence": [{"checksum": "crc16-ccitt", "fields": []}],
        }));
        let outcome = crude_parse(b"$$ABC,1,2*43\n", Some(&cfg)).unwrap();
        assert_eq!(outcome.value["_basic"], true);
        assert_eq!(outcome.candidate_errors.len(), 1);
    }

    #[test]
    fn checksum_is_computed_over_raw_bytes_not_a_lossy_reencoding() {
        // 0xFF is not valid UTF-8 on its own; a lossy re-encoding would turn
        // it into the 3-byte U+FFFD sequence before the checksum saw it.
        let mut data = b"ABC,1,\xFF".to_vec();
        let checksum = xor_checksum(&data);
        let mut sentence = b"$$".to_vec();
        sentence.append(&mut data);
        sentence.push(b'*');
        sentence.extend_from_slice(checksum.as_bytes());
        sentence.push(b'\n');

        let outcome = crude_parse(&sentence, None).unwrap();
        assert_eq!(outcome.value["payload"], "ABC");
    }

    #[test]
    fn ddmm_conversion_matches_input_precision() {
        let cfg = PayloadConfiguration::from_value(json!({
            "payload": "ABC",
            "sentence": {
                "checksum": "xor",
                "fields": [
                    {"name": "lat", "sensor": "stdtelem.coordinate", "format": "ddmm.mmmm"},
                ],
            },
        }));
        // data = "ABC,5130.1234" -> field value "5130.1234"
        let data = "ABC,5130.1234";
        let checksum = xor_checksum(data.as_bytes());
        let sentence = format!("$${data}*{checksum}\n");
        let outcome = crude_parse(sentence.as_bytes(), Some(&cfg)).unwrap();
        let lat = outcome.value["lat"].as_str().unwrap();
        // 51 + 30.1234/60 = 51.502056666...
        assert!(lat.starts_with("51.5"));
    }
}
