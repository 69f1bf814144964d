/*
Copyright 2026 Flowroute Developers

This file is part of Flowroute.

Flowroute is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Flowroute is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Flowroute. If not, see https://www.gnu.org/licenses/.
*/

//! Module assembling per-cell RVIC results into one streamflow grid.
//!
//! The domain mask defines the set of expected cells. Each result file
//! names its own cell with the outlet indices, and is written into the grid
//! only when that cell is still missing. Files that cannot be used are
//! rejected with a reason and never stop the job. Cells that stay missing
//! are reported at the end, so the jobs can be rerun just for them.
//!
//! Files are validated in parallel in chunks, and every chunk is ingested
//! in sorted name order before the next one is read. Only one chunk of
//! result streamflows is held at a time and for duplicated cells the
//! first file always wins.

use super::{configuration::Reassemble, progress_bar, Core};
use crate::constants::{
    HYDROMODEL_PREFIX, LAT_NAME, LON_NAME, MASK_VAR, NC_FILL_FLOAT, OUTLETS_DIM, OUTLET_X_VAR,
    OUTLET_Y_VAR, STREAMFLOW_VAR, TIME_NAME,
};
use crate::errors::{DatasetError, Rejection, ToolError};
use crate::routing::dataset::Dataset;
use crate::routing::grid::{check_same_grid, Cell, Grid};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use ndarray::{s, Array3, ArrayView1};
use rayon::prelude::*;
use rayon::ThreadPool;
use rustc_hash::FxHashSet;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Fill of the assembled streamflow, stored as netCDF `float`.
pub const STREAMFLOW_FILL: f32 = NC_FILL_FLOAT as f32;

/// Result files validated per pool thread before ingestion.
const FILES_PER_THREAD: usize = 4;

/// Result file that passed all structural checks.
#[derive(Clone, PartialEq, Debug)]
pub struct ValidatedResult {
    pub cell: Cell,
    pub streamflow: Vec<f32>,
}

/// Outcome of the whole assembly.
#[derive(Clone, PartialEq, Debug)]
pub struct AssemblyReport {
    pub processed: usize,
    pub rejected: Vec<(PathBuf, Rejection)>,
    /// Sorted by row, then column.
    pub missing: Vec<Cell>,
}

impl AssemblyReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// All cells of the domain, none has a result yet.
pub fn initialize_missing_set(mask: &Grid) -> FxHashSet<Cell> {
    mask.positive_cells().into_iter().collect()
}

/// Checks that the file is a single-outlet RVIC history
/// with `time_len` streamflow values.
pub fn validate_result_file(path: &Path, time_len: usize) -> Result<ValidatedResult, Rejection> {
    if !path.is_file() {
        return Err(Rejection::NotFound);
    }

    if path.extension().map_or(true, |ext| ext != "nc") {
        return Err(Rejection::WrongExtension);
    }

    let dataset = Dataset::open(path).map_err(unreadable)?;

    let outlets = dataset
        .dimension(OUTLETS_DIM)
        .map_err(|_| Rejection::MissingDimension(OUTLETS_DIM))?;

    for name in [OUTLET_X_VAR, OUTLET_Y_VAR, STREAMFLOW_VAR] {
        if !dataset.has_variable(name) {
            return Err(Rejection::MissingVariable(name));
        }
    }

    if outlets != 1 {
        return Err(Rejection::OutletCount(outlets));
    }

    let x = read_index(&dataset, OUTLET_X_VAR)?;
    let y = read_index(&dataset, OUTLET_Y_VAR)?;

    let streamflow: Vec<f32> = dataset
        .read_values(STREAMFLOW_VAR)
        .map_err(unreadable)?
        .into_iter()
        .map(|v| v.map_or(STREAMFLOW_FILL, |v| v as f32))
        .collect();

    if streamflow.len() != time_len {
        return Err(Rejection::WrongLength {
            expected: time_len,
            found: streamflow.len(),
        });
    }

    Ok(ValidatedResult {
        cell: Cell::new(y, x),
        streamflow,
    })
}

fn unreadable(err: DatasetError) -> Rejection {
    Rejection::Unreadable(err.to_string())
}

fn read_index(dataset: &Dataset, name: &'static str) -> Result<usize, Rejection> {
    let values = dataset.read_values(name).map_err(unreadable)?;

    match values.first() {
        Some(Some(v)) if *v >= 0.0 && v.fract() == 0.0 => Ok(*v as usize),
        _ => Err(Rejection::BadIndex(name)),
    }
}

/// Writes the result into `output` (indexed `[time, lat, lon]`)
/// if its cell is still missing, and marks the cell as done.
pub fn ingest(
    result: &ValidatedResult,
    missing: &mut FxHashSet<Cell>,
    output: &mut Array3<f32>,
) -> Result<Cell, Rejection> {
    let cell = result.cell;

    if result.streamflow.len() != output.dim().0 {
        return Err(Rejection::WrongLength {
            expected: output.dim().0,
            found: result.streamflow.len(),
        });
    }

    if !missing.remove(&cell) {
        return Err(Rejection::UnexpectedCell(cell.row, cell.col));
    }

    output
        .slice_mut(s![.., cell.row, cell.col])
        .assign(&ArrayView1::from(&result.streamflow));

    Ok(cell)
}

pub fn finalize(
    processed: usize,
    rejected: Vec<(PathBuf, Rejection)>,
    missing: FxHashSet<Cell>,
) -> AssemblyReport {
    let mut missing: Vec<Cell> = missing.into_iter().collect();
    missing.sort_unstable();

    AssemblyReport {
        processed,
        rejected,
        missing,
    }
}

/// Files ingested by [`ingest_files`].
#[derive(Clone, PartialEq, Debug, Default)]
struct Ingestion {
    processed: usize,
    rejected: Vec<(PathBuf, Rejection)>,
    /// First validated file, source of the output metadata.
    template: Option<PathBuf>,
}

/// Validates `chunk_size` files at a time on the pool
/// and ingests each chunk in file order.
fn ingest_files(
    threadpool: &ThreadPool,
    files: &[PathBuf],
    chunk_size: usize,
    missing: &mut FxHashSet<Cell>,
    streamflow: &mut Array3<f32>,
    bar: &ProgressBar,
) -> Ingestion {
    let time_len = streamflow.dim().0;
    let mut ingestion = Ingestion::default();

    for chunk in files.chunks(chunk_size.max(1)) {
        let validated: Vec<Result<ValidatedResult, Rejection>> = threadpool.install(|| {
            chunk
                .par_iter()
                .map(|path| {
                    let result = validate_result_file(path, time_len);
                    bar.inc(1);
                    result
                })
                .collect()
        });

        for (path, result) in chunk.iter().zip(validated) {
            let outcome = result.and_then(|result| {
                if ingestion.template.is_none() {
                    ingestion.template = Some(path.clone());
                }

                ingest(&result, missing, streamflow)
            });

            match outcome {
                Ok(cell) => {
                    debug!(
                        "Ingested {} for x: {} y: {}",
                        path.display(),
                        cell.x(),
                        cell.y()
                    );
                    ingestion.processed += 1;
                }
                Err(rejection) => {
                    warn!("Rejected {}: {}", path.display(), rejection);
                    ingestion.rejected.push((path.clone(), rejection));
                }
            }
        }
    }

    ingestion
}

/// Runs the `reassemble` job.
pub fn run(core: &Core, settings: &Reassemble) -> Result<(), ToolError> {
    info!("Reading baseflow and domain");
    let baseflow = Dataset::open(&settings.baseflow)?;
    let domain = Dataset::open(&settings.domain)?;

    let mask = Grid::from_dataset(&domain, MASK_VAR)?;
    check_same_grid(&mask, &baseflow, "baseflow file")?;
    let time_len = baseflow.dimension(TIME_NAME)?;

    let mut missing = initialize_missing_set(&mask);
    info!("Looking for {} cells", missing.len());

    let files = list_result_files(&settings.streamflow_dir)?;
    debug!(
        "Found {} files in {}",
        files.len(),
        settings.streamflow_dir.display()
    );

    let (rows, cols) = mask.shape();
    let mut streamflow = Array3::from_elem((time_len, rows, cols), STREAMFLOW_FILL);

    let bar = progress_bar(files.len() as u64, "Ingested files");

    let ingestion = ingest_files(
        &core.threadpool,
        &files,
        core.threadpool.current_num_threads() * FILES_PER_THREAD,
        &mut missing,
        &mut streamflow,
        &bar,
    );

    bar.finish_with_message("All files ingested");

    if ingestion.template.is_none() {
        warn!("No valid result files, output has no streamflow metadata");
    }

    info!("Writing output");
    save_output(
        &settings.output,
        &baseflow,
        &domain,
        ingestion.template.as_deref(),
        &streamflow,
    )?;

    let report = finalize(ingestion.processed, ingestion.rejected, missing);

    info!("Processed {} streamflow files", report.processed);

    if !report.rejected.is_empty() {
        warn!("Rejected {} files", report.rejected.len());
    }

    if report.is_complete() {
        info!("Watershed as defined in domain file is complete");
    } else {
        warn!(
            "{} grid cells missing from this watershed",
            report.missing.len()
        );

        for cell in &report.missing {
            debug!("Missing x: {} y: {}", cell.x(), cell.y());
        }
    }

    if let Some(path) = &settings.missing_report {
        save_missing(&report.missing, &mask, path)?;
    }

    Ok(())
}

/// Regular files of the directory in sorted order.
fn list_result_files(dir: &Path) -> Result<Vec<PathBuf>, io::Error> {
    let mut files = vec![];

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            debug!("Skipping directory {}", path.display());
            continue;
        }

        files.push(path);
    }

    files.sort();

    Ok(files)
}

/// Output grid: `time` from the baseflow, coordinates from the domain,
/// global and streamflow attributes from the template result.
fn save_output(
    path: &Path,
    baseflow: &Dataset,
    domain: &Dataset,
    template: Option<&Path>,
    streamflow: &Array3<f32>,
) -> Result<(), DatasetError> {
    let mut output = netcdf::create(path)?;

    baseflow.copy_coordinate(TIME_NAME, &mut output)?;
    domain.copy_coordinate(LAT_NAME, &mut output)?;
    domain.copy_coordinate(LON_NAME, &mut output)?;

    let hydromodel = baseflow.attributes()?;
    debug!("{} hydromodel metadata attributes added", hydromodel.len());

    for (name, value) in hydromodel {
        output.add_attribute(&format!("{}{}", HYDROMODEL_PREFIX, name), value)?;
    }

    let mut streamflow_attributes = vec![];

    if let Some(template) = template.map(Dataset::open).transpose()? {
        for (name, value) in template.attributes()? {
            output.add_attribute(&name, value)?;
        }

        streamflow_attributes = template.variable_attributes(STREAMFLOW_VAR)?;
    }

    let mut variable =
        output.add_variable::<f32>(STREAMFLOW_VAR, &[TIME_NAME, LAT_NAME, LON_NAME])?;
    variable.set_fill_value(STREAMFLOW_FILL)?;

    for (name, value) in streamflow_attributes {
        if name != "_FillValue" {
            variable.put_attribute(&name, value)?;
        }
    }

    let values = streamflow.as_standard_layout();
    let values = values
        .as_slice()
        .ok_or_else(|| DatasetError::IncorrectShape(STREAMFLOW_VAR.to_string()))?;

    variable.put_values(values, ..)?;

    Ok(())
}

fn save_missing(missing: &[Cell], mask: &Grid, path: &Path) -> Result<(), ToolError> {
    let mut out_file = csv::Writer::from_path(path)?;

    out_file.write_record(&["x", "y", "lon", "lat"])?;

    for cell in missing {
        let (lon, lat) = mask.xy_to_lonlat(*cell);

        out_file.write_record(&[
            cell.x().to_string(),
            cell.y().to_string(),
            lon.to_string(),
            lat.to_string(),
        ])?;
    }

    out_file.flush()?;

    Ok(())
}
