//! Chunked, parallel resolution of a table against the reference index.
//!
//! Each address group is applied in turn: output columns are planned next to
//! the columns they describe, the table is split into contiguous row chunks,
//! and every chunk is resolved independently on a fixed-size rayon pool. The
//! reference index is shared by reference — it is immutable after
//! construction, so workers need no synchronization. Chunks are concatenated
//! back in input order; overflow columns created in some chunks but not
//! others are reconciled during the merge.
//!
//! Row-level lookup failures are data (recorded in the status column), group
//! validation failures skip the group with a warning, and an unexpected
//! chunk error invalidates the whole conversion.

use anyhow::{Context, Result, anyhow, bail};
use itertools::Itertools;
use log::{info, warn};
use rayon::prelude::*;

use crate::{
    cli::ConvertArgs,
    detect::{self, AddressGroup},
    frame::Frame,
    io_utils,
    normalize::normalize_key,
    reference::{Candidate, ReferenceIndex},
};

/// Exact status-column value of a fully converted row.
pub const SUCCESS_MARKER: &str = "success";

/// Floor for the per-chunk row count; small tables stay single-chunk.
const MIN_CHUNK_ROWS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub workers: usize,
    pub status_column: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            workers: default_workers(),
            status_column: "conversion_status".to_string(),
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionSummary {
    pub total_rows: usize,
    pub success_count: usize,
    pub fail_count: usize,
}

/// Applies every address group to the table and tallies per-row outcomes.
///
/// The status column is appended once, before any group runs; a row counts
/// as successful only when its status equals [`SUCCESS_MARKER`] exactly,
/// which holds only when no group failed for it.
pub fn convert_frame(
    mut frame: Frame,
    index: &ReferenceIndex,
    groups: &[AddressGroup],
    options: &ConvertOptions,
) -> Result<(Frame, ConversionSummary)> {
    let workers = options.workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Building conversion worker pool")?;

    if frame.column_index(&options.status_column).is_none() {
        frame.push_column(&options.status_column);
    }

    for (group_idx, group) in groups.iter().enumerate() {
        let suffix = format!("_group{}", group_idx + 1);
        let label = format!("group{}", group_idx + 1);
        if !group.is_usable() {
            warn!(
                "Skipping {label}: needs a ward column plus a province or district column ({group:?})"
            );
            continue;
        }
        frame = apply_group(frame, index, group, &suffix, &label, options, &pool, workers)
            .with_context(|| format!("Applying address group {label}"))?;
    }

    let status_idx = frame
        .column_index(&options.status_column)
        .ok_or_else(|| anyhow!("Status column '{}' vanished", options.status_column))?;
    let total_rows = frame.row_count();
    let success_count = frame
        .rows()
        .iter()
        .filter(|row| row.get(status_idx).is_some_and(|s| s == SUCCESS_MARKER))
        .count();
    let summary = ConversionSummary {
        total_rows,
        success_count,
        fail_count: total_rows - success_count,
    };
    Ok((frame, summary))
}

/// Column names one group resolves from and writes to; looked up per chunk
/// because overflow insertions shift positions.
struct GroupPlan {
    province_col: Option<String>,
    district_col: Option<String>,
    ward_col: String,
    province_id_col: String,
    ward_id_col: String,
    province_name_col: String,
    status_col: String,
    label: String,
}

#[allow(clippy::too_many_arguments)]
fn apply_group(
    mut frame: Frame,
    index: &ReferenceIndex,
    group: &AddressGroup,
    suffix: &str,
    label: &str,
    options: &ConvertOptions,
    pool: &rayon::ThreadPool,
    workers: usize,
) -> Result<Frame> {
    let Some(ward_col) = group.ward.clone() else {
        bail!("Group carries no ward column");
    };
    for named in [&group.province, &group.district, &group.ward]
        .into_iter()
        .flatten()
    {
        if frame.column_index(named).is_none() {
            bail!("Address column '{named}' not found in input table");
        }
    }
    if frame.row_count() == 0 {
        return Ok(frame);
    }

    // Original id columns are consumed: dropped here and replaced by fresh
    // output columns of the same name.
    let province_id_col = group
        .province_id
        .clone()
        .unwrap_or_else(|| format!("province_id{suffix}"));
    let ward_id_col = group
        .ward_id
        .clone()
        .unwrap_or_else(|| format!("ward_id{suffix}"));
    for stale in [&group.district_id, &group.province_id, &group.ward_id]
        .into_iter()
        .flatten()
    {
        frame.drop_column(stale);
    }

    if frame.column_index(&province_id_col).is_none() {
        let anchor = group.province.as_deref().unwrap_or(&ward_col);
        match frame.column_index(anchor) {
            Some(pos) => frame.insert_column(pos, &province_id_col),
            None => frame.push_column(&province_id_col),
        }
    }
    if frame.column_index(&ward_id_col).is_none()
        && let Some(pos) = frame.column_index(&ward_col)
    {
        frame.insert_column(pos, &ward_id_col);
    }

    let province_name_col = match &group.province {
        Some(name) => name.clone(),
        None => {
            let synthesized = format!("provinceName{suffix}");
            if frame.column_index(&synthesized).is_none()
                && let Some(pos) = frame.column_index(&province_id_col)
            {
                frame.insert_column(pos + 1, &synthesized);
            }
            synthesized
        }
    };

    let plan = GroupPlan {
        province_col: group.province.clone(),
        district_col: group.district.clone(),
        ward_col,
        province_id_col,
        ward_id_col,
        province_name_col,
        status_col: options.status_column.clone(),
        label: label.to_string(),
    };

    let total_rows = frame.row_count();
    let chunk_rows = MIN_CHUNK_ROWS.max(total_rows / (workers * 2));
    let headers = frame.headers().to_vec();
    let rows = frame.take_rows();
    let chunks = rows
        .chunks(chunk_rows)
        .map(|chunk| Frame::from_parts(headers.clone(), chunk.to_vec()))
        .collect_vec();

    let resolved = pool.install(|| {
        chunks
            .into_par_iter()
            .map(|chunk| process_chunk(chunk, index, &plan))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut merged = Frame::concat_chunks(resolved)?;

    // District names exist only to disambiguate lookups; drop them once the
    // group is done.
    if let Some(district_col) = &plan.district_col {
        merged.drop_column(district_col);
    }
    Ok(merged)
}

/// Column positions for one chunk's current layout.
struct ChunkColumns {
    province: Option<usize>,
    district: Option<usize>,
    ward: usize,
    province_id: usize,
    ward_id: usize,
    province_name: usize,
    status: usize,
}

impl ChunkColumns {
    fn locate(chunk: &Frame, plan: &GroupPlan) -> Result<Self> {
        let required = |name: &str| {
            chunk
                .column_index(name)
                .ok_or_else(|| anyhow!("Output column '{name}' missing from chunk layout"))
        };
        Ok(ChunkColumns {
            province: plan
                .province_col
                .as_deref()
                .and_then(|name| chunk.column_index(name)),
            district: plan
                .district_col
                .as_deref()
                .and_then(|name| chunk.column_index(name)),
            ward: required(&plan.ward_col)?,
            province_id: required(&plan.province_id_col)?,
            ward_id: required(&plan.ward_id_col)?,
            province_name: required(&plan.province_name_col)?,
            status: required(&plan.status_col)?,
        })
    }
}

fn process_chunk(mut chunk: Frame, index: &ReferenceIndex, plan: &GroupPlan) -> Result<Frame> {
    let mut cols = ChunkColumns::locate(&chunk, plan)?;

    for row in 0..chunk.row_count() {
        let province_raw = cols
            .province
            .map(|idx| chunk.value(row, idx).to_string())
            .unwrap_or_default();
        let district_raw = cols
            .district
            .map(|idx| chunk.value(row, idx).to_string())
            .unwrap_or_default();
        let ward_raw = chunk.value(row, cols.ward).to_string();

        let key = normalize_key(&province_raw, &district_raw, &ward_raw);
        match index.resolve(&key) {
            Some(candidates) => {
                write_candidate(&mut chunk, row, &cols, &candidates[0]);
                for (offset, extra) in candidates.iter().skip(1).enumerate() {
                    let option = offset + 2;
                    cols = ensure_option_columns(&mut chunk, plan, option)?;
                    write_option(&mut chunk, row, plan, option, extra)?;
                }
                if chunk.value(row, cols.status).is_empty() {
                    chunk.set_value(row, cols.status, SUCCESS_MARKER.to_string());
                }
            }
            None => {
                let status = chunk.value(row, cols.status);
                if status.is_empty() || status == SUCCESS_MARKER {
                    chunk.set_value(row, cols.status, plan.label.clone());
                } else {
                    let joined = format!("{status};{}", plan.label);
                    chunk.set_value(row, cols.status, joined);
                }
            }
        }
    }
    Ok(chunk)
}

fn write_candidate(chunk: &mut Frame, row: usize, cols: &ChunkColumns, candidate: &Candidate) {
    chunk.set_value(row, cols.province_name, candidate.province.clone());
    chunk.set_value(row, cols.ward, candidate.ward.clone());
    chunk.set_value(row, cols.province_id, candidate.province_id.clone());
    chunk.set_value(row, cols.ward_id, candidate.ward_id.clone());
}

fn option_names(plan: &GroupPlan, option: usize) -> (String, String) {
    (
        format!("{}_option_{option}", plan.ward_id_col),
        format!("{}_option_{option}", plan.ward_col),
    )
}

/// Lazily creates the numbered overflow columns for a multi-candidate match:
/// ward id then ward name, positioned immediately after the previous option
/// (or the primary ward column for option 2). Re-resolves the cached column
/// positions afterwards since insertions shift the layout.
fn ensure_option_columns(
    chunk: &mut Frame,
    plan: &GroupPlan,
    option: usize,
) -> Result<ChunkColumns> {
    let (id_name, name_name) = option_names(plan, option);
    if chunk.column_index(&id_name).is_none() {
        let previous = if option > 2 {
            format!("{}_option_{}", plan.ward_col, option - 1)
        } else {
            plan.ward_col.clone()
        };
        let anchor = chunk
            .column_index(&previous)
            .ok_or_else(|| anyhow!("Overflow anchor column '{previous}' missing"))?;
        chunk.insert_column(anchor + 1, &id_name);
    }
    if chunk.column_index(&name_name).is_none() {
        let anchor = chunk
            .column_index(&id_name)
            .ok_or_else(|| anyhow!("Overflow id column '{id_name}' missing"))?;
        chunk.insert_column(anchor + 1, &name_name);
    }
    ChunkColumns::locate(chunk, plan)
}

fn write_option(
    chunk: &mut Frame,
    row: usize,
    plan: &GroupPlan,
    option: usize,
    candidate: &Candidate,
) -> Result<()> {
    let (id_name, name_name) = option_names(plan, option);
    let id_idx = chunk
        .column_index(&id_name)
        .ok_or_else(|| anyhow!("Overflow column '{id_name}' missing"))?;
    let name_idx = chunk
        .column_index(&name_name)
        .ok_or_else(|| anyhow!("Overflow column '{name_name}' missing"))?;
    chunk.set_value(row, id_idx, candidate.ward_id.clone());
    chunk.set_value(row, name_idx, candidate.ward.clone());
    Ok(())
}

/// `convert` subcommand: load the reference, obtain address groups (from a
/// saved group file or by detection), convert, and write the result.
pub fn execute(args: &ConvertArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let output_delimiter = io_utils::resolve_output_delimiter(
        args.output.as_deref(),
        args.output_delimiter,
        delimiter,
    );
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;

    let (index, known) = ReferenceIndex::load(&args.reference)
        .with_context(|| format!("Loading reference mapping from {:?}", args.reference))?;
    info!(
        "Reference index holds {} canonical key(s) from {:?}",
        index.len(),
        args.reference
    );

    let frame = Frame::read_csv(&args.input, delimiter, encoding)
        .with_context(|| format!("Reading input table {:?}", args.input))?;

    let groups: Vec<AddressGroup> = match &args.groups {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Opening group file {path:?}"))?;
            serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("Parsing address groups from {path:?}"))?
        }
        None => {
            let requested = if args.sample_rows == 0 {
                detect::sample_size(frame.row_count())
            } else {
                args.sample_rows
            };
            let sample = &frame.rows()[..requested.min(frame.row_count())];
            detect::detect(frame.headers(), sample, &known)
        }
    };
    if groups.is_empty() {
        bail!("No address column groups detected or supplied; nothing to convert");
    }

    let workers = args.workers.unwrap_or_else(default_workers);
    let options = ConvertOptions {
        workers,
        status_column: args.status_column.clone(),
    };
    info!(
        "Converting {} row(s) across {} address group(s) with {} worker(s)",
        frame.row_count(),
        groups.len(),
        workers
    );

    let (converted, summary) = convert_frame(frame, &index, &groups, &options)?;
    converted.write_csv(args.output.as_deref(), output_delimiter)?;
    info!(
        "Converted {} row(s): {} succeeded, {} failed",
        summary.total_rows, summary.success_count, summary.fail_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceRecord;

    fn reference() -> (ReferenceIndex, crate::reference::KnownValueSets) {
        let mut first = ReferenceRecord::default();
        first.old_province = "Hà Nội".to_string();
        first.old_district = "Gia Lâm".to_string();
        first.old_ward = "Yên Viên".to_string();
        first.new_province = "Hà Nội".to_string();
        first.new_ward = "Yên Viên".to_string();
        first.new_province_id = "01".to_string();
        first.new_ward_id = "00001".to_string();
        ReferenceIndex::build(&[first])
    }

    fn group() -> AddressGroup {
        AddressGroup {
            province: Some("tinh".to_string()),
            district: Some("huyen".to_string()),
            ward: Some("xa".to_string()),
            ..AddressGroup::default()
        }
    }

    fn input_frame() -> Frame {
        Frame::from_parts(
            vec!["tinh".to_string(), "huyen".to_string(), "xa".to_string()],
            vec![
                vec!["Hà Nội".into(), "Gia Lâm".into(), "Yên Viên".into()],
                vec!["Unknown".into(), "Unknown".into(), "Unknown".into()],
                vec!["Hà Nội".into(), "Gia Lâm".into(), "Yên Viên".into()],
            ],
        )
    }

    fn options(workers: usize) -> ConvertOptions {
        ConvertOptions {
            workers,
            status_column: "conversion_status".to_string(),
        }
    }

    #[test]
    fn end_to_end_counts_and_field_writes() {
        let (index, _) = reference();
        let (frame, summary) =
            convert_frame(input_frame(), &index, &[group()], &options(2)).expect("convert");

        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.fail_count, 1);

        // District column is consumed; id columns sit next to their names.
        assert_eq!(
            frame.headers(),
            [
                "province_id_group1",
                "tinh",
                "ward_id_group1",
                "xa",
                "conversion_status"
            ]
        );
        assert_eq!(
            frame.rows()[0],
            vec!["01", "Hà Nội", "00001", "Yên Viên", "success"]
        );
        assert_eq!(frame.rows()[1][4], "group1");
        assert_eq!(frame.rows()[0], frame.rows()[2]);
    }

    #[test]
    fn worker_count_does_not_change_output() {
        let (index, _) = reference();
        let (serial, _) =
            convert_frame(input_frame(), &index, &[group()], &options(1)).expect("serial");
        let (parallel, _) =
            convert_frame(input_frame(), &index, &[group()], &options(8)).expect("parallel");
        assert_eq!(serial, parallel);
    }

    #[test]
    fn unusable_group_is_skipped_and_rows_count_as_failed() {
        let (index, _) = reference();
        let lone_ward = AddressGroup {
            ward: Some("xa".to_string()),
            ..AddressGroup::default()
        };
        let (frame, summary) =
            convert_frame(input_frame(), &index, &[lone_ward], &options(1)).expect("convert");
        // Table untouched apart from the status column.
        assert_eq!(frame.headers(), ["tinh", "huyen", "xa", "conversion_status"]);
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.fail_count, 3);
    }

    #[test]
    fn multi_candidate_match_creates_option_columns_for_that_row_only() {
        let mut split = ReferenceRecord::default();
        split.old_province = "Hà Nội".to_string();
        split.old_district = "Gia Lâm".to_string();
        split.old_ward = "Yên Viên".to_string();
        split.new_province = "Hà Nội".to_string();
        split.new_ward = "Phù Đổng".to_string();
        split.new_province_id = "01".to_string();
        split.new_ward_id = "00002".to_string();
        let mut base = ReferenceRecord::default();
        base.old_province = "Hà Nội".to_string();
        base.old_district = "Gia Lâm".to_string();
        base.old_ward = "Yên Viên".to_string();
        base.new_province = "Hà Nội".to_string();
        base.new_ward = "Yên Viên".to_string();
        base.new_province_id = "01".to_string();
        base.new_ward_id = "00001".to_string();
        let mut plain = ReferenceRecord::default();
        plain.old_province = "Hà Nội".to_string();
        plain.old_district = "Đông Anh".to_string();
        plain.old_ward = "Cổ Loa".to_string();
        plain.new_province = "Hà Nội".to_string();
        plain.new_ward = "Cổ Loa".to_string();
        plain.new_province_id = "01".to_string();
        plain.new_ward_id = "00003".to_string();
        let (index, _) = ReferenceIndex::build(&[base, split, plain]);

        let frame = Frame::from_parts(
            vec!["tinh".to_string(), "huyen".to_string(), "xa".to_string()],
            vec![
                vec!["Hà Nội".into(), "Đông Anh".into(), "Cổ Loa".into()],
                vec!["Hà Nội".into(), "Gia Lâm".into(), "Yên Viên".into()],
            ],
        );
        let (converted, summary) =
            convert_frame(frame, &index, &[group()], &options(1)).expect("convert");

        assert_eq!(summary.success_count, 2);
        assert_eq!(
            converted.headers(),
            [
                "province_id_group1",
                "tinh",
                "ward_id_group1",
                "xa",
                "ward_id_group1_option_2",
                "xa_option_2",
                "conversion_status"
            ]
        );
        // Single-candidate row leaves the option cells empty.
        let single = &converted.rows()[0];
        assert_eq!(single[3], "Cổ Loa");
        assert_eq!(single[4], "");
        assert_eq!(single[5], "");
        let multi = &converted.rows()[1];
        assert_eq!(multi[3], "Yên Viên");
        assert_eq!(multi[2], "00001");
        assert_eq!(multi[4], "00002");
        assert_eq!(multi[5], "Phù Đổng");
    }

    #[test]
    fn later_group_failure_overrides_success_marker() {
        let (index, _) = reference();
        let second = AddressGroup {
            province: Some("tinh2".to_string()),
            ward: Some("xa2".to_string()),
            ..AddressGroup::default()
        };
        let frame = Frame::from_parts(
            vec![
                "tinh".to_string(),
                "huyen".to_string(),
                "xa".to_string(),
                "tinh2".to_string(),
                "xa2".to_string(),
            ],
            vec![vec![
                "Hà Nội".into(),
                "Gia Lâm".into(),
                "Yên Viên".into(),
                "Nowhere".into(),
                "Nowhere".into(),
            ]],
        );
        let (converted, summary) =
            convert_frame(frame, &index, &[group(), second], &options(1)).expect("convert");
        let status_idx = converted.column_index("conversion_status").expect("status");
        assert_eq!(converted.value(0, status_idx), "group2");
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.fail_count, 1);
    }
}
