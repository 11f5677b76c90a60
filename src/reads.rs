use std::collections::HashSet;
use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{AccessionRecord, ReadEntry};
use crate::error::PrepError;
use crate::layout::symlink_checked;

pub const READ_DIR: &str = "readData";
pub const READ_LIST: &str = "read.list.txt";

static REMOTE_SOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagedReads {
    pub linked: Vec<Utf8PathBuf>,
    pub skipped: Vec<String>,
}

/// Rebuilds `run_dir/readData` with one link per existing read file.
///
/// The directory only ever holds links, so it is wiped on every call.
pub fn stage_reads(run_dir: &Utf8Path, file_locations: &[&str]) -> Result<StagedReads, PrepError> {
    let read_dir = run_dir.join(READ_DIR);
    if fs::symlink_metadata(read_dir.as_std_path()).is_ok() {
        fs::remove_dir_all(read_dir.as_std_path()).map_err(|err| PrepError::fs(&read_dir, err))?;
    }
    fs::create_dir_all(read_dir.as_std_path()).map_err(|err| PrepError::fs(&read_dir, err))?;

    let mut staged = StagedReads::default();
    let mut names = HashSet::new();
    for location in file_locations {
        let location = location.trim();
        if REMOTE_SOURCE.is_match(location) {
            return Err(PrepError::UnsupportedSource(location.to_string()));
        }
        let source = Utf8Path::new(location);
        if !source.as_std_path().exists() {
            warn!(file = %location, "read file does not exist, skipping");
            staged.skipped.push(location.to_string());
            continue;
        }
        let name = source.file_name().unwrap_or_default().to_string();
        if !names.insert(name.clone()) {
            return Err(PrepError::DuplicateReadFile(file_locations.join("\n")));
        }
        let target = read_dir.join(&name);
        symlink_checked(source, &target)?;
        debug!(target = %target, "staged read file");
        staged.linked.push(target);
    }
    Ok(staged)
}

/// Derives one read list row per `file_location` entry.
pub fn read_entries(accession: &AccessionRecord) -> Result<Vec<ReadEntry>, PrepError> {
    let locations = accession.file_locations();
    let mut columns = Vec::with_capacity(3);
    for attribute in ["pair_id", "mate_id", "label"] {
        let lines = accession.lines(attribute).ok_or_else(|| {
            PrepError::Configuration(format!(
                "specify a {attribute} attribute for accession {}",
                accession.name
            ))
        })?;
        if lines.len() != locations.len() {
            return Err(PrepError::Configuration(format!(
                "{attribute} needs to have exactly one line for each file defined in file_location in accession {}",
                accession.name
            )));
        }
        columns.push(lines);
    }
    locations
        .iter()
        .enumerate()
        .map(|(index, location)| {
            ReadEntry::from_location(
                location,
                columns[0][index],
                columns[1][index],
                columns[2][index],
            )
        })
        .collect()
}

/// Writes `read.list.txt`, one tab separated row per input file.
pub fn write_read_list(
    run_dir: &Utf8Path,
    accession: &AccessionRecord,
) -> Result<Vec<ReadEntry>, PrepError> {
    let entries = read_entries(accession)?;
    let mut content = String::new();
    for entry in &entries {
        content.push_str(&entry.to_line());
        content.push('\n');
    }
    let target = run_dir.join(READ_LIST);
    fs::write(target.as_std_path(), content).map_err(|err| PrepError::fs(&target, err))?;
    Ok(entries)
}
