//! Serial frame decoding: `LPG:<v>,CH4:<v>,CO:<v>,Temperature:<v>`.

use crate::error::{HazardError, Result};
use crate::readings::data::{Metric, NewReading};

/// One unparsed line as delivered by the sensor device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    bytes: Vec<u8>,
}

impl RawLine {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode as UTF-8 and strip the line ending and surrounding whitespace.
    pub fn decode(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes)
            .map(str::trim)
            .map_err(|e| {
                HazardError::malformed(
                    String::from_utf8_lossy(&self.bytes).into_owned(),
                    format!("invalid UTF-8: {e}"),
                )
            })
    }
}

impl From<&str> for RawLine {
    fn from(line: &str) -> Self {
        Self::new(line.as_bytes())
    }
}

/// Parse a decoded frame into a validated reading.
///
/// Each metric must appear exactly once; unknown keys are rejected.
pub fn parse_frame(line: &str) -> Result<NewReading> {
    let line = line.trim();
    if line.is_empty() {
        return Err(HazardError::malformed(line, "empty frame"));
    }

    let mut slots = [None; 4];
    for segment in line.split(',') {
        let (key, value) = segment
            .split_once(':')
            .ok_or_else(|| HazardError::malformed(line, format!("segment {segment:?} lacks ':'")))?;
        let key = key.trim();
        let value = value.trim();

        let metric = Metric::from_frame_key(key)
            .ok_or_else(|| HazardError::malformed(line, format!("unexpected key {key:?}")))?;
        let number: f64 = value
            .parse()
            .map_err(|_| HazardError::malformed(line, format!("{key} is not numeric: {value:?}")))?;

        let slot = &mut slots[NewReading::slot_index(metric)];
        if slot.is_some() {
            return Err(HazardError::malformed(line, format!("duplicate key {key:?}")));
        }
        *slot = Some(number);
    }

    if let Some(metric) = Metric::ALL
        .iter()
        .find(|metric| slots[NewReading::slot_index(**metric)].is_none())
    {
        return Err(HazardError::malformed(
            line,
            format!("missing key {:?}", metric.frame_key()),
        ));
    }

    NewReading::from_slots(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_frame() {
        let reading = parse_frame("LPG:12.5,CH4:30,CO:4,Temperature:26.1").unwrap();
        assert_eq!(reading.lpg, 12.5);
        assert_eq!(reading.ch4, 30.0);
        assert_eq!(reading.co, 4.0);
        assert_eq!(reading.temperature, 26.1);
    }

    #[test]
    fn key_order_and_spacing_do_not_matter() {
        let reading = parse_frame(" Temperature: 25 , CO:3 ,CH4:2, LPG:1 ").unwrap();
        assert_eq!(reading, NewReading::new(1.0, 2.0, 3.0, 25.0).unwrap());
    }

    #[test]
    fn rejects_non_numeric_value() {
        let err = parse_frame("LPG:12,CH4:oops,CO:3,Temperature:25").unwrap_err();
        match err {
            HazardError::MalformedLine { line, reason } => {
                assert_eq!(line, "LPG:12,CH4:oops,CO:3,Temperature:25");
                assert!(reason.contains("CH4"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_structural_problems() {
        for line in [
            "",
            "LPG:1,CH4:2,CO:3",
            "LPG:1,CH4:2,CO3,Temperature:4",
            "LPG:1,CH4:2,CO:3,Temperature:4,Humidity:5",
            "LPG:1,LPG:2,CO:3,Temperature:4",
            "lpg:1,CH4:2,CO:3,Temperature:4",
        ] {
            assert!(
                matches!(parse_frame(line), Err(HazardError::MalformedLine { .. })),
                "{line:?} should be malformed"
            );
        }
    }

    #[test]
    fn non_finite_values_are_validation_failures() {
        assert!(matches!(
            parse_frame("LPG:NaN,CH4:2,CO:3,Temperature:4"),
            Err(HazardError::Validation(_))
        ));
    }

    #[test]
    fn raw_line_decoding_trims_line_endings() {
        let raw = RawLine::new(b"LPG:1,CH4:2,CO:3,Temperature:4\r\n".to_vec());
        assert_eq!(raw.decode().unwrap(), "LPG:1,CH4:2,CO:3,Temperature:4");

        let garbage = RawLine::new(vec![0xff, 0xfe, b'\n']);
        assert!(matches!(
            garbage.decode(),
            Err(HazardError::MalformedLine { .. })
        ));
    }
}
