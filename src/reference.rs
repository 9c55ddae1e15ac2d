//! Reference mapping from old administrative units to the current scheme.
//!
//! The reference dataset is a JSON array of records keyed by the original
//! dataset's Vietnamese column names ("Mã I (CŨ)", "Tỉnh (CŨ)", …). It is
//! loaded once at startup into a [`ReferenceIndex`]: a hash map from the
//! canonicalized old (province, district, ward) triple to the ordered list of
//! new-scheme candidates. Duplicate keys are appended, never overwritten —
//! boundary splits legitimately map one old triple to several new units.
//!
//! Construction also derives the [`KnownValueSets`] used by column detection.
//! Both structures are immutable after construction and safe to share across
//! worker threads by reference.

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::BufReader,
    path::Path,
};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::normalize::{CanonicalKey, canonical, normalize_key};

/// Fatal reference-data failures; the engine cannot operate without the
/// mapping, so these abort before any conversion starts.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference mapping file not found: {0}")]
    Missing(String),
    #[error("failed to read reference mapping {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse reference mapping {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// One new-scheme output candidate attached to a canonical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub province: String,
    pub ward: String,
    pub province_id: String,
    pub ward_id: String,
}

/// Old-side ids (raw) and names (canonicalized) observed while building the
/// index; consumed only by column detection.
#[derive(Debug, Default)]
pub struct KnownValueSets {
    pub province_ids: HashSet<String>,
    pub district_ids: HashSet<String>,
    pub ward_ids: HashSet<String>,
    pub provinces: HashSet<String>,
    pub districts: HashSet<String>,
    pub wards: HashSet<String>,
}

/// One row of the reference dataset, old side plus new side.
#[derive(Debug, Clone, Default)]
pub struct ReferenceRecord {
    pub old_province_id: String,
    pub old_district_id: String,
    pub old_ward_id: String,
    pub old_province: String,
    pub old_district: String,
    pub old_ward: String,
    pub new_province: String,
    pub new_ward: String,
    pub new_province_id: String,
    pub new_ward_id: String,
}

impl ReferenceRecord {
    /// Extracts a record from a raw JSON object. Absent fields become empty
    /// strings; numeric values are stringified rather than rejected.
    fn from_json(row: &Map<String, Value>) -> Self {
        ReferenceRecord {
            old_province_id: field(row, "Mã I (CŨ)"),
            old_district_id: field(row, "Mã II (CŨ)"),
            old_ward_id: field(row, "Mã III (CŨ)"),
            old_province: field(row, "Tỉnh (CŨ)"),
            old_district: field(row, "Huyện (CŨ)"),
            old_ward: field(row, "Xã (CŨ)"),
            new_province: field(row, "Tỉnh"),
            new_ward: field(row, "Xã"),
            new_province_id: field(row, "Mã I"),
            new_ward_id: field(row, "Mã III"),
        }
    }
}

fn field(row: &Map<String, Value>, key: &str) -> String {
    match row.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

/// Ambiguity-aware lookup structure over the reference dataset.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    entries: HashMap<CanonicalKey, Vec<Candidate>>,
    // Secondary index for the fallback scan: canonical ward -> keys sharing
    // that ward component. Same observable behavior as a full key scan.
    by_ward: HashMap<String, Vec<CanonicalKey>>,
}

impl ReferenceIndex {
    /// Builds the index and the known-value sets from reference records.
    pub fn build(records: &[ReferenceRecord]) -> (Self, KnownValueSets) {
        let mut index = ReferenceIndex::default();
        let mut known = KnownValueSets::default();

        for record in records {
            let key = normalize_key(
                &record.old_province,
                &record.old_district,
                &record.old_ward,
            );
            let candidate = Candidate {
                province: record.new_province.clone(),
                ward: record.new_ward.clone(),
                province_id: record.new_province_id.clone(),
                ward_id: record.new_ward_id.clone(),
            };
            match index.entries.get_mut(&key) {
                Some(candidates) => candidates.push(candidate),
                None => {
                    index
                        .by_ward
                        .entry(key.ward.clone())
                        .or_default()
                        .push(key.clone());
                    index.entries.insert(key, vec![candidate]);
                }
            }

            if !record.old_province_id.is_empty() {
                known.province_ids.insert(record.old_province_id.clone());
            }
            if !record.old_district_id.is_empty() {
                known.district_ids.insert(record.old_district_id.clone());
            }
            if !record.old_ward_id.is_empty() {
                known.ward_ids.insert(record.old_ward_id.clone());
            }
            insert_canonical(&mut known.provinces, &record.old_province);
            insert_canonical(&mut known.districts, &record.old_district);
            insert_canonical(&mut known.wards, &record.old_ward);
        }

        (index, known)
    }

    /// Loads the reference mapping from a JSON file.
    pub fn load(path: &Path) -> Result<(Self, KnownValueSets), ReferenceError> {
        if !path.exists() {
            return Err(ReferenceError::Missing(path.display().to_string()));
        }
        let file = File::open(path).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rows: Vec<Map<String, Value>> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ReferenceError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let records: Vec<ReferenceRecord> =
            rows.iter().map(ReferenceRecord::from_json).collect();
        Ok(Self::build(&records))
    }

    /// Exact lookup; candidates come back in reference insertion order.
    pub fn get(&self, key: &CanonicalKey) -> Option<&[Candidate]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Exact match first; otherwise scans keys whose ward component equals
    /// the probe's ward and whose province or district matches. Exactly one
    /// such key resolves; two or more is an ambiguous lookup and hard-fails.
    pub fn resolve(&self, key: &CanonicalKey) -> Option<&[Candidate]> {
        if let Some(candidates) = self.get(key) {
            return Some(candidates);
        }
        let mut found: Option<&CanonicalKey> = None;
        for indexed in self.by_ward.get(&key.ward)?.iter() {
            if indexed.province == key.province || indexed.district == key.district {
                if found.is_some() {
                    return None;
                }
                found = Some(indexed);
            }
        }
        found.and_then(|key| self.get(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn insert_canonical(set: &mut HashSet<String>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    let normalized = canonical(raw);
    if !normalized.is_empty() {
        set.insert(normalized);
    }
}
