//! Address-column detection over a sampled table.
//!
//! Detection runs in three steps:
//!
//! 1. **Classification** — every sampled value is canonicalized exactly like
//!    row data will be at conversion time, then counted against the six
//!    known-value sets derived from the reference mapping. A column becomes a
//!    role candidate when more than 96% of its non-empty sampled values match.
//! 2. **Keyword filtering** — multi-candidate roles are narrowed to columns
//!    whose header contains a role keyword (Vietnamese and English spellings,
//!    with and without diacritics); filtering never narrows to zero. Id roles
//!    additionally require at least one numerically parseable sampled value.
//! 3. **Grouping** — each ward-name candidate anchors one [`AddressGroup`];
//!    remaining role candidates are attached to anchors by greedy maximum
//!    Jaro-Winkler similarity over header names, with a release-and-refill
//!    pass for anchors whose naming convention does not correlate with any
//!    province or district column.

use std::collections::VecDeque;

use anyhow::{Context, Result, bail};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    cli::DetectArgs,
    frame::Frame,
    io_utils,
    normalize::canonical,
    reference::{KnownValueSets, ReferenceIndex},
    table,
};

/// Fraction of a column's non-empty sampled values that must match a
/// known-value set for the column to become a role candidate.
const MATCH_THRESHOLD: f64 = 0.96;

const PROVINCE_KEYWORDS: &[&str] = &[
    "tỉnh",
    "thành phố",
    "tỉnh/thành phố",
    "tỉnh thành",
    "province",
    "provincename",
    "prov",
    "city",
    "tinh",
    "thanhpho",
    "tinhthanh",
    "thanh pho",
    "tinh thanh",
];

const DISTRICT_KEYWORDS: &[&str] = &[
    "huyện",
    "quận",
    "thị xã",
    "huyện/quận",
    "districtname",
    "district",
    "dist",
    "town",
    "township",
    "town ship",
    "quan",
    "huyen",
    "thi xa",
    "thixa",
    "quanhuyen",
];

const WARD_KEYWORDS: &[&str] = &[
    "xã",
    "phường",
    "thị trấn",
    "xã/phường",
    "wardname",
    "communename",
    "commune",
    "ward",
    "townlet",
    "xa",
    "phuong",
    "thi tran",
    "thitran",
    "phuongxa",
];

/// Up to six columns that together encode one province/district/ward address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressGroup {
    #[serde(default)]
    pub province_id: Option<String>,
    #[serde(default)]
    pub district_id: Option<String>,
    #[serde(default)]
    pub ward_id: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub ward: Option<String>,
}

impl AddressGroup {
    /// A group is usable when it names a ward column and at least one of the
    /// province or district name columns.
    pub fn is_usable(&self) -> bool {
        self.ward.is_some() && (self.province.is_some() || self.district.is_some())
    }
}

/// Representative sample size for a table: about 1%, clamped to [10, 500].
pub fn sample_size(total_rows: usize) -> usize {
    (total_rows / 100).clamp(10, 500)
}

/// Detects address groups from a row sample and the reference-derived
/// known-value sets. Groups failing validation are still returned so the
/// caller can report why they will be skipped.
pub fn detect(headers: &[String], sample: &[Vec<String>], known: &KnownValueSets) -> Vec<AddressGroup> {
    let numeric: Vec<bool> = (0..headers.len())
        .map(|col| {
            sample
                .iter()
                .any(|row| row.get(col).is_some_and(|v| v.trim().parse::<f64>().is_ok()))
        })
        .collect();

    let mut province_id_cands = Vec::new();
    let mut district_id_cands = Vec::new();
    let mut ward_id_cands = Vec::new();
    let mut province_cands = Vec::new();
    let mut district_cands = Vec::new();
    let mut ward_cands = Vec::new();

    for (col, header) in headers.iter().enumerate() {
        let values = sample
            .iter()
            .filter_map(|row| row.get(col))
            .map(|value| canonical(value))
            .filter(|value| !value.is_empty())
            .collect_vec();
        if values.is_empty() {
            continue;
        }
        let threshold = values.len() as f64 * MATCH_THRESHOLD;

        let mut counts = [0usize; 6];
        for value in &values {
            counts[0] += usize::from(known.province_ids.contains(value));
            counts[1] += usize::from(known.district_ids.contains(value));
            counts[2] += usize::from(known.ward_ids.contains(value));
            counts[3] += usize::from(known.provinces.contains(value));
            counts[4] += usize::from(known.districts.contains(value));
            counts[5] += usize::from(known.wards.contains(value));
        }

        let targets = [
            &mut province_id_cands,
            &mut district_id_cands,
            &mut ward_id_cands,
            &mut province_cands,
            &mut district_cands,
            &mut ward_cands,
        ];
        for (count, target) in counts.into_iter().zip(targets) {
            if count as f64 > threshold {
                target.push(header.clone());
            }
        }
    }

    let is_numeric = |name: &String| {
        headers
            .iter()
            .position(|header| header == name)
            .is_some_and(|idx| numeric[idx])
    };
    let province_id_cands = filter_by_keywords(province_id_cands, PROVINCE_KEYWORDS)
        .into_iter()
        .filter(&is_numeric)
        .collect_vec();
    let district_id_cands = filter_by_keywords(district_id_cands, DISTRICT_KEYWORDS)
        .into_iter()
        .filter(&is_numeric)
        .collect_vec();
    let ward_id_cands = filter_by_keywords(ward_id_cands, WARD_KEYWORDS)
        .into_iter()
        .filter(&is_numeric)
        .collect_vec();
    let province_cands = filter_by_keywords(province_cands, PROVINCE_KEYWORDS);
    let district_cands = filter_by_keywords(district_cands, DISTRICT_KEYWORDS);
    let ward_cands = filter_by_keywords(ward_cands, WARD_KEYWORDS);

    debug!(
        "Candidate columns: province ids {province_id_cands:?}, district ids {district_id_cands:?}, \
         ward ids {ward_id_cands:?}, provinces {province_cands:?}, districts {district_cands:?}, \
         wards {ward_cands:?}"
    );

    group_candidates(
        province_id_cands,
        district_id_cands,
        ward_id_cands,
        province_cands,
        district_cands,
        ward_cands,
    )
}

/// Narrows a multi-candidate role by header keywords; keeps the unfiltered
/// set rather than discarding down to zero.
fn filter_by_keywords(candidates: Vec<String>, keywords: &[&str]) -> Vec<String> {
    if candidates.len() <= 1 {
        return candidates;
    }
    let filtered = candidates
        .iter()
        .filter(|name| {
            let lowered = name.to_lowercase();
            keywords.iter().any(|keyword| lowered.contains(keyword))
        })
        .cloned()
        .collect_vec();
    if filtered.is_empty() { candidates } else { filtered }
}

struct SimilarityMatrix {
    cells: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    fn new(anchors: &[String], candidates: &[String]) -> Self {
        let cells = anchors
            .iter()
            .map(|anchor| {
                candidates
                    .iter()
                    .map(|candidate| similarity(anchor, candidate))
                    .collect()
            })
            .collect();
        SimilarityMatrix { cells }
    }

    /// First occurrence (row-major) of the largest positive cell.
    fn max_cell(&self) -> Option<(usize, usize)> {
        let mut best = 0.0f64;
        let mut position = None;
        for (row, cols) in self.cells.iter().enumerate() {
            for (col, value) in cols.iter().enumerate() {
                if *value > best {
                    best = *value;
                    position = Some((row, col));
                }
            }
        }
        position
    }

    /// Retires an anchor/candidate pairing so neither side is reused.
    fn clear(&mut self, row: usize, col: usize) {
        for value in &mut self.cells[row] {
            *value = 0.0;
        }
        for cols in &mut self.cells {
            cols[col] = 0.0;
        }
    }
}

fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase())
}

/// Greedy maximum-similarity assignment of one role's candidates to ward
/// anchors: repeatedly take the global matrix maximum, assign, and zero out
/// the used row and column.
fn assign_role(anchors: &[String], candidates: &[String]) -> Vec<Option<usize>> {
    let mut assignments = vec![None; anchors.len()];
    if candidates.is_empty() {
        return assignments;
    }
    let mut matrix = SimilarityMatrix::new(anchors, candidates);
    while let Some((row, col)) = matrix.max_cell() {
        assignments[row] = Some(col);
        matrix.clear(row, col);
    }
    assignments
}

fn group_candidates(
    province_ids: Vec<String>,
    district_ids: Vec<String>,
    ward_ids: Vec<String>,
    provinces: Vec<String>,
    districts: Vec<String>,
    wards: Vec<String>,
) -> Vec<AddressGroup> {
    if wards.is_empty() {
        return Vec::new();
    }

    // Degenerate layout: one address, at most one candidate per role.
    if wards.len() == 1
        && province_ids.len() <= 1
        && district_ids.len() <= 1
        && ward_ids.len() <= 1
        && provinces.len() <= 1
        && districts.len() <= 1
    {
        return vec![AddressGroup {
            province_id: province_ids.into_iter().next(),
            district_id: district_ids.into_iter().next(),
            ward_id: ward_ids.into_iter().next(),
            province: provinces.into_iter().next(),
            district: districts.into_iter().next(),
            ward: wards.into_iter().next(),
        }];
    }

    let mut roles = [province_ids, district_ids, ward_ids, provinces, districts];
    let mut used: Vec<Vec<bool>> = roles.iter().map(|cands| vec![false; cands.len()]).collect();
    let mut assigned: Vec<Vec<Option<usize>>> = roles
        .iter()
        .map(|candidates| assign_role(&wards, candidates))
        .collect();
    for (role, assignments) in assigned.iter().enumerate() {
        for assignment in assignments.iter().flatten() {
            used[role][*assignment] = true;
        }
    }

    // Anchors that attracted neither a province nor a district column cannot
    // have followed the sibling naming convention; release their tentative id
    // assignments back into the pools.
    let mut unresolved = Vec::new();
    for anchor in 0..wards.len() {
        if assigned[3][anchor].is_none() && assigned[4][anchor].is_none() {
            for role in 0..3 {
                if let Some(candidate) = assigned[role][anchor].take() {
                    used[role][candidate] = false;
                }
            }
            unresolved.push(anchor);
        }
    }

    if !unresolved.is_empty() {
        let mut pools: Vec<VecDeque<usize>> = roles
            .iter()
            .enumerate()
            .map(|(role, candidates)| {
                (0..candidates.len())
                    .filter(|idx| !used[role][*idx])
                    .collect()
            })
            .collect();
        for anchor in unresolved {
            for (role, pool) in pools.iter_mut().enumerate() {
                assigned[role][anchor] = pool.pop_front();
            }
        }
    }

    let mut groups = Vec::with_capacity(wards.len());
    for (anchor, ward) in wards.into_iter().enumerate() {
        let mut take = |role: usize| {
            assigned[role][anchor].map(|idx| std::mem::take(&mut roles[role][idx]))
        };
        groups.push(AddressGroup {
            province_id: take(0),
            district_id: take(1),
            ward_id: take(2),
            province: take(3),
            district: take(4),
            ward: Some(ward),
        });
    }
    groups
}

/// `detect` subcommand: sample the input, detect groups, render them, and
/// optionally save them as JSON for later `convert` runs.
pub fn execute(args: &DetectArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;

    let (_, known) = ReferenceIndex::load(&args.reference)
        .with_context(|| format!("Loading reference mapping from {:?}", args.reference))?;

    let frame = Frame::read_csv(&args.input, delimiter, encoding)
        .with_context(|| format!("Reading input table {:?}", args.input))?;
    if frame.row_count() == 0 {
        bail!("Input table {:?} has no data rows", args.input);
    }

    let requested = if args.sample_rows == 0 {
        sample_size(frame.row_count())
    } else {
        args.sample_rows
    };
    let sample = &frame.rows()[..requested.min(frame.row_count())];
    info!(
        "Detecting address columns in '{}' from {} sampled row(s)",
        args.input.display(),
        sample.len()
    );

    let groups = detect(frame.headers(), sample, &known);
    if groups.is_empty() {
        warn!("No address column groups detected");
        return Ok(());
    }

    let rows = groups
        .iter()
        .enumerate()
        .map(|(idx, group)| {
            vec![
                format!("group{}", idx + 1),
                group.province_id.clone().unwrap_or_default(),
                group.district_id.clone().unwrap_or_default(),
                group.ward_id.clone().unwrap_or_default(),
                group.province.clone().unwrap_or_default(),
                group.district.clone().unwrap_or_default(),
                group.ward.clone().unwrap_or_default(),
                if group.is_usable() { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect_vec();
    let headers = [
        "group",
        "province_id",
        "district_id",
        "ward_id",
        "province",
        "district",
        "ward",
        "usable",
    ]
    .map(str::to_string)
    .to_vec();
    table::print_table(&headers, &rows);

    if let Some(path) = &args.output {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Creating group file {path:?}"))?;
        serde_json::to_writer_pretty(file, &groups)
            .with_context(|| format!("Writing address groups to {path:?}"))?;
        info!("{} address group(s) written to {:?}", groups.len(), path);
    }
    Ok(())
}
