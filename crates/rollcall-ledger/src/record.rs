//! Attendance records and identity-label parsing.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Identifier used when a label carries no `<id>_<name>` structure.
pub const PLACEHOLDER_IDENTIFIER: &str = "Unknown";

const LABEL_SEPARATOR: char = '_';

pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// One person marked present. Serialized as a CSV row
/// `Identifier,Name,Date,Time` with `DD-MM-YYYY` / `HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "Identifier")]
    pub identifier: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Date", with = "day_format")]
    pub date: NaiveDate,
    #[serde(rename = "Time", with = "clock_format")]
    pub time: NaiveTime,
}

impl AttendanceRecord {
    /// Record for `label` stamped at `at`.
    pub fn from_label(label: &str, at: NaiveDateTime) -> Self {
        let (identifier, name) = split_label(label);
        Self {
            identifier,
            name,
            date: at.date(),
            time: at.time(),
        }
    }

    /// `(identifier, name, date, time)` with the file's text formats.
    pub fn to_tuple(&self) -> (String, String, String, String) {
        (
            self.identifier.clone(),
            self.name.clone(),
            self.date.format(DATE_FORMAT).to_string(),
            self.time.format(TIME_FORMAT).to_string(),
        )
    }

    pub(crate) fn same_person(&self, other: &AttendanceRecord) -> bool {
        self.identifier == other.identifier && self.name == other.name
    }
}

/// Split `<identifier>_<name>` on the first separator.
///
/// Labels without a separator, or with an empty half, keep the whole label
/// as the name under the placeholder identifier.
pub fn split_label(label: &str) -> (String, String) {
    match label.split_once(LABEL_SEPARATOR) {
        Some((id, name)) if !id.is_empty() && !name.is_empty() => (id.to_string(), name.to_string()),
        _ => (PLACEHOLDER_IDENTIFIER.to_string(), label.to_string()),
    }
}

/// Records for one run, every record sharing the single timestamp `at`.
///
/// Deduplicated on the parsed (identifier, name) in first-seen order, so
/// labels such as `Bob` and `Unknown_Bob` yield one record.
pub fn records_for<S: AsRef<str>>(labels: &[S], at: NaiveDateTime) -> Vec<AttendanceRecord> {
    let mut records: Vec<AttendanceRecord> = Vec::with_capacity(labels.len());
    for label in labels {
        let record = AttendanceRecord::from_label(label.as_ref(), at);
        if !records.iter().any(|r| r.same_person(&record)) {
            records.push(record);
        }
    }
    records
}

mod day_format {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod clock_format {
    use super::TIME_FORMAT;
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_split_label_on_first_separator() {
        assert_eq!(split_label("21BCS001_Alice"), ("21BCS001".into(), "Alice".into()));
        assert_eq!(split_label("21BCS001_Mary_Jane"), ("21BCS001".into(), "Mary_Jane".into()));
    }

    #[test]
    fn test_split_label_without_separator_uses_placeholder() {
        assert_eq!(split_label("Alice"), ("Unknown".into(), "Alice".into()));
        assert_eq!(split_label("_Alice"), ("Unknown".into(), "_Alice".into()));
        assert_eq!(split_label("Alice_"), ("Unknown".into(), "Alice_".into()));
    }

    #[test]
    fn test_records_share_one_timestamp_and_dedup() {
        let labels = ["21BCS001_Alice", "Bob", "21BCS001_Alice"];
        let records = records_for(&labels, at(9, 5, 30));

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.time == at(9, 5, 30).time()));
        assert_eq!(
            records[0].to_tuple(),
            ("21BCS001".into(), "Alice".into(), "07-03-2025".into(), "09:05:30".into())
        );
        assert_eq!(records[1].identifier, "Unknown");
        assert_eq!(records[1].name, "Bob");
    }

    #[test]
    fn test_records_dedup_on_parsed_person() {
        let labels = ["Bob", "21BCS001_Alice", "Unknown_Bob"];
        let records = records_for(&labels, at(9, 0, 0));
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Alice"]);
        assert_eq!(records[0].identifier, "Unknown");
    }

    #[test]
    fn test_records_for_empty() {
        let labels: [&str; 0] = [];
        assert!(records_for(&labels, at(8, 0, 0)).is_empty());
    }
}
