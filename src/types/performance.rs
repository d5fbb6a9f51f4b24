//! Per-model performance records and the ordered performance table

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Measured quality and latency of one model on the validation split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub mcc: f64,
    /// Wall-clock seconds spent in `detect`
    #[serde(rename = "time")]
    pub latency_seconds: f64,
}

/// Round to three decimals, the precision every stored metric carries.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Model name -> record, kept in evaluation order.
///
/// Selection walks this order, so it is backed by a sequence rather than a map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PerformanceTable {
    entries: Vec<(String, PerformanceRecord)>,
}

impl PerformanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; an existing name keeps its position and gets the new record.
    pub fn insert(&mut self, name: impl Into<String>, record: PerformanceRecord) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = record,
            None => self.entries.push((name, record)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PerformanceRecord> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, record)| record)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PerformanceRecord)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, PerformanceRecord)> for PerformanceTable {
    fn from_iter<I: IntoIterator<Item = (String, PerformanceRecord)>>(iter: I) -> Self {
        let mut table = PerformanceTable::new();
        for (name, record) in iter {
            table.insert(name, record);
        }
        table
    }
}

// Stored as a JSON object whose key order is the evaluation order.
impl Serialize for PerformanceTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, record) in &self.entries {
            map.serialize_entry(name, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PerformanceTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = PerformanceTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of model name to performance record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = PerformanceTable::new();
                while let Some((name, record)) =
                    access.next_entry::<String, PerformanceRecord>()?
                {
                    table.insert(name, record);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(f1: f64) -> PerformanceRecord {
        PerformanceRecord {
            precision: 0.5,
            recall: 0.5,
            f1,
            mcc: 0.1,
            latency_seconds: 0.25,
        }
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.123456), 0.123);
        assert_eq!(round3(0.6666), 0.667);
        assert_eq!(round3(-0.3333), -0.333);
    }

    #[test]
    fn test_insert_keeps_first_position() {
        let mut table = PerformanceTable::new();
        table.insert("LODA", record(0.1));
        table.insert("ECOD", record(0.2));
        table.insert("LODA", record(0.9));

        assert_eq!(table.names(), vec!["LODA", "ECOD"]);
        assert_eq!(table.get("LODA").map(|r| r.f1), Some(0.9));
    }

    #[test]
    fn test_json_keeps_insertion_order() {
        let table: PerformanceTable = vec![
            ("SUOD".to_string(), record(0.3)),
            ("ECOD".to_string(), record(0.2)),
            ("COPOD".to_string(), record(0.1)),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&table).unwrap();
        assert!(json.find("SUOD").unwrap() < json.find("ECOD").unwrap());
        assert!(json.find("ECOD").unwrap() < json.find("COPOD").unwrap());
        assert!(json.contains("\"time\":0.25"));

        let parsed: PerformanceTable = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(parsed.names(), vec!["SUOD", "ECOD", "COPOD"]);
    }

    #[test]
    fn test_reads_artifact_with_time_key() {
        let json =
            r#"{"LODA": {"precision": 0.4, "recall": 0.3, "f1": 0.343, "mcc": 0.12, "time": 1.5}}"#;
        let table: PerformanceTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.get("LODA").unwrap().latency_seconds, 1.5);
    }
}
