//! IFC (ISO 10303-21) to JSON element index conversion.
//!
//! The output lists the file header, how many instances of each entity type
//! the model holds, and every rooted element (any instance whose first
//! attribute is an IFC GlobalId) with its name.

pub mod step;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use self::step::{Record, StepValue, Statements, parse_instance, parse_record};
use crate::utils::fs::io_error;

const STEP_MAGIC: &str = "ISO-10303-21";

/// Characters of the compressed 22-character IFC GUID encoding.
const GUID_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_$";

#[derive(Error, Debug)]
pub enum IfcError {
    #[error("not an ISO 10303-21 file (missing 'ISO-10303-21;' header)")]
    NotStep,

    #[error("no DATA section found")]
    MissingData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IfcHeader {
    pub description: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,
    pub author: Vec<String>,
    pub organization: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessor_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originating_system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IfcElement {
    pub id: u64,
    #[serde(rename = "type")]
    pub type_name: String,
    pub global_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The JSON document written for an IFC job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IfcIndex {
    pub schema: Option<String>,
    pub header: IfcHeader,
    pub entity_count: usize,
    /// Instances per entity type, sorted by type name.
    pub types: BTreeMap<String, usize>,
    pub elements: Vec<IfcElement>,
    /// DATA statements that could not be parsed.
    pub skipped: usize,
}

/// Whether `value` is a 22-character compressed IFC GUID.
pub fn is_ifc_guid(value: &str) -> bool {
    value.len() == 22
        && value.starts_with(['0', '1', '2', '3'])
        && value.chars().all(|c| GUID_ALPHABET.contains(c))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Header,
    Data,
    Done,
}

/// Build the element index of a STEP physical file.
pub fn index_step(text: &str) -> Result<IfcIndex, IfcError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut statements = Statements::new(text).filter(|s| !s.is_empty());

    match statements.next() {
        Some(first) if first.eq_ignore_ascii_case(STEP_MAGIC) => {}
        _ => return Err(IfcError::NotStep),
    }

    let mut index = IfcIndex::default();
    let mut section = Section::Preamble;
    let mut saw_data = false;

    for statement in statements {
        let keyword = statement
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match (section, keyword.as_str()) {
            (_, "HEADER") => section = Section::Header,
            (_, "DATA") => {
                section = Section::Data;
                saw_data = true;
            }
            (_, "ENDSEC") => section = Section::Preamble,
            (_, "END-ISO-10303-21") => section = Section::Done,
            (Section::Header, _) => match parse_record(&statement) {
                Ok(record) => apply_header(&mut index, record),
                Err(e) => debug!(error = %e, "Skipping unreadable header entry"),
            },
            (Section::Data, _) => match parse_instance(&statement) {
                Ok(instance) => {
                    index.entity_count += 1;
                    let record = instance.record;
                    if let Some(global_id) = record.params.first().and_then(StepValue::as_str)
                        && is_ifc_guid(global_id)
                    {
                        index.elements.push(IfcElement {
                            id: instance.id,
                            type_name: record.name.clone(),
                            global_id: global_id.to_string(),
                            name: record
                                .params
                                .get(2)
                                .and_then(StepValue::as_str)
                                .map(str::to_string),
                        });
                    }
                    *index.types.entry(record.name).or_default() += 1;
                }
                Err(e) => {
                    index.skipped += 1;
                    debug!(error = %e, "Skipping unreadable DATA statement");
                }
            },
            _ => {}
        }

        if section == Section::Done {
            break;
        }
    }

    if !saw_data {
        return Err(IfcError::MissingData);
    }
    if index.skipped > 0 {
        warn!(skipped = index.skipped, "Some IFC statements could not be parsed");
    }
    Ok(index)
}

fn apply_header(index: &mut IfcIndex, record: Record) {
    let header = &mut index.header;
    let params = &record.params;
    let string_at = |i: usize| params.get(i).and_then(StepValue::as_str).map(str::to_string);
    let strings_at = |i: usize| params.get(i).map(StepValue::strings).unwrap_or_default();

    match record.name.as_str() {
        "FILE_DESCRIPTION" => {
            header.description = strings_at(0);
            header.implementation_level = string_at(1);
        }
        "FILE_NAME" => {
            header.name = string_at(0);
            header.time_stamp = string_at(1);
            header.author = strings_at(2);
            header.organization = strings_at(3);
            header.preprocessor_version = string_at(4);
            header.originating_system = string_at(5);
            header.authorization = string_at(6);
        }
        "FILE_SCHEMA" => {
            index.schema = strings_at(0).into_iter().next();
        }
        other => debug!(entry = other, "Ignoring header entry"),
    }
}

/// Convert the IFC file at `input` into a JSON index at `output`.
///
/// The JSON is written next to `output` first and renamed into place.
pub fn convert_file(input: &Path, output: &Path) -> crate::Result<IfcIndex> {
    let bytes = std::fs::read(input).map_err(|e| io_error("reading IFC input", input, e))?;
    let text = String::from_utf8_lossy(&bytes);
    let index = index_step(&text)?;

    let json = serde_json::to_vec_pretty(&index)?;
    let partial = output.with_extension("json.part");
    std::fs::write(&partial, json).map_err(|e| io_error("writing IFC index", &partial, e))?;
    std::fs::rename(&partial, output).map_err(|e| io_error("finalizing IFC index", output, e))?;
    Ok(index)
}
