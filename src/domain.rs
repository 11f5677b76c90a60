use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::PrepError;

/// Attributes holding one newline-separated entry per input read file.
pub const PARALLEL_ATTRIBUTES: [&str; 5] =
    ["file_location", "pair_id", "mate_id", "label", "file_type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Fastq,
    Bam,
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputType::Fastq => write!(f, "fastq"),
            InputType::Bam => write!(f, "bam"),
        }
    }
}

impl FromStr for InputType {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fastq" => Ok(InputType::Fastq),
            "bam" => Ok(InputType::Bam),
            other => Err(PrepError::Configuration(format!(
                "every accession needs a 'type' parameter with possible values of 'fastq' or 'bam', found '{other}'"
            ))),
        }
    }
}

/// Metadata of one sequencing experiment as found in the accession database.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessionRecord {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

impl AccessionRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Entries of a parallel attribute, split on newlines without trimming.
    pub fn lines(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key).map(|value| value.split('\n').collect())
    }

    pub fn file_locations(&self) -> Vec<&str> {
        self.lines("file_location").unwrap_or_default()
    }

    pub fn input_type(&self) -> Result<InputType, PrepError> {
        self.get("type").unwrap_or_default().parse()
    }

    /// Collapses multi-line scalar attributes down to their first line.
    pub fn normalize(&mut self) {
        for (key, value) in self.attributes.iter_mut() {
            if PARALLEL_ATTRIBUTES.contains(&key.as_str()) {
                continue;
            }
            if let Some((first, _)) = value.split_once('\n') {
                *value = first.to_string();
            }
        }
    }
}

/// One row of `read.list.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadEntry {
    pub file_name: String,
    pub pair_id: String,
    pub mate_id: String,
    pub label: String,
}

impl ReadEntry {
    pub fn from_location(
        location: &str,
        pair_id: &str,
        mate_id: &str,
        label: &str,
    ) -> Result<Self, PrepError> {
        let file_name = Utf8Path::new(location.trim())
            .file_name()
            .unwrap_or_default()
            .to_string();
        let file_name = match file_name.rsplit('.').next() {
            Some("bam") => file_name.as_str(),
            Some("gz") => file_name.strip_suffix(".gz").unwrap_or_default(),
            _ => {
                return Err(PrepError::Configuration(format!(
                    "expecting .fastq file to be gzipped: {location}"
                )));
            }
        };
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(PrepError::Configuration(format!(
                "no read file name in {location}"
            )));
        }
        Ok(Self {
            file_name: file_name.to_string(),
            pair_id: compact(pair_id),
            mate_id: compact(mate_id),
            label: compact(label),
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.file_name, self.pair_id, self.mate_id, self.label
        )
    }
}

fn compact(value: &str) -> String {
    value.trim().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_input_type() {
        assert_eq!("fastq".parse::<InputType>().unwrap(), InputType::Fastq);
        assert_eq!("bam".parse::<InputType>().unwrap(), InputType::Bam);
        let err = "sam".parse::<InputType>().unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }

    #[test]
    fn normalize_keeps_parallel_attributes() {
        let mut accession = AccessionRecord::new("TestRun")
            .with("species", "Homo sapiens\nHomo sapiens")
            .with("pair_id", "testA\ntestA")
            .with("file_type", "fastq\nfastq");
        accession.normalize();
        assert_eq!(accession.get("species"), Some("Homo sapiens"));
        assert_eq!(accession.get("pair_id"), Some("testA\ntestA"));
        assert_eq!(accession.get("file_type"), Some("fastq\nfastq"));
    }

    #[test]
    fn read_entry_strips_gz() {
        let entry =
            ReadEntry::from_location("/data/testA.r1.fastq.gz ", "test A", "testA.1", "Test")
                .unwrap();
        assert_eq!(entry.file_name, "testA.r1.fastq");
        assert_eq!(entry.pair_id, "testA");
        assert_eq!(entry.to_line(), "testA.r1.fastq\ttestA\ttestA.1\tTest");
    }

    #[test]
    fn read_entry_keeps_bam() {
        let entry = ReadEntry::from_location("/data/sample.bam", "1", "1", "L").unwrap();
        assert_eq!(entry.file_name, "sample.bam");
    }

    #[test]
    fn read_entry_rejects_plain_fastq() {
        let err = ReadEntry::from_location("/data/sample.fastq", "1", "1", "L").unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }

    #[test]
    fn read_entry_rejects_bare_gz_name() {
        for location in ["/data/gz", "/data/.gz"] {
            let err = ReadEntry::from_location(location, "a", "a", "L").unwrap_err();
            assert_matches!(err, PrepError::Configuration(message) if message.contains(location));
        }
    }
}
