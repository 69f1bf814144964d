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

//! Module splitting a routing domain into PBS batch jobs.
//!
//! RVIC is a source to sink model and cannot reuse computations
//! between points, so every domain cell is routed on its own and cells
//! can be grouped into batches arbitrarily. Batches only spread the cost
//! of copying the large inputs to the node over several points,
//! which are then computed one after another by the same job.
//!
//! Cells are enumerated in row-major order and that order numbers
//! the points and the jobs, so it must not change between runs.

pub mod calendar;
pub mod pbs;

use self::calendar::SimulationPeriod;
use self::pbs::{JobDescriptor, SharedConfig};
use super::{configuration::Queue, prepare_output_dir};
use crate::constants::MASK_VAR;
use crate::errors::{DatasetError, QueueError, ToolError};
use crate::routing::dataset::Dataset;
use crate::routing::grid::{check_same_grid, Cell, Grid};
use crate::Float;
use log::{debug, info, warn};
use std::fs;

/// Single domain cell to route.
#[derive(Clone, PartialEq, Debug)]
pub struct WorkItem {
    pub cell: Cell,
    pub lon: Float,
    pub lat: Float,
    /// Also the name of the pour point.
    pub case_id: String,
}

/// Identification of the climate model run that forced
/// the hydrology model, read from the global attributes of its output.
#[derive(Clone, PartialEq, Debug)]
pub struct RunMetadata {
    pub model: String,
    pub experiment: String,
    pub run: String,
}

impl RunMetadata {
    pub fn from_dataset(dataset: &Dataset) -> Result<Self, DatasetError> {
        let run = [
            "downscaling_GCM_realization",
            "downscaling_GCM_initialization_method",
            "downscaling_GCM_physics_version",
        ]
        .iter()
        .map(|name| dataset.attribute_string(name))
        .collect::<Result<Vec<String>, DatasetError>>()?
        .concat();

        Ok(RunMetadata {
            model: dataset.attribute_string("downscaling_GCM_model_id")?,
            experiment: dataset.attribute_string("downscaling_GCM_experiment_id")?,
            run,
        })
    }

    /// Case string of the RVIC convolution step.
    pub fn case_string(&self) -> String {
        format!("{}+{}+{}", self.model, self.experiment, self.run)
    }
}

/// Cells with positive mask, in row-major order.
pub fn enumerate_domain_cells(mask: &Grid) -> Vec<Cell> {
    mask.positive_cells()
}

/// Splits items into consecutive batches of `batch_size` items,
/// only the last batch can be shorter.
pub fn partition<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    items
        .chunks(batch_size.max(1))
        .map(|batch| batch.to_vec())
        .collect()
}

pub fn build_work_item(cell: Cell, grid: &Grid, metadata: &RunMetadata) -> WorkItem {
    let (lon, lat) = grid.xy_to_lonlat(cell);

    WorkItem {
        cell,
        lon,
        lat,
        case_id: format!(
            "{}_{}_{}_x{}_y{}",
            metadata.model,
            metadata.experiment,
            metadata.run,
            cell.x(),
            cell.y()
        ),
    }
}

/// Job script of one batch, see [`pbs::render`].
pub fn emit_batch_descriptor(
    process: usize,
    first_point: usize,
    batch: &[WorkItem],
    shared: &SharedConfig,
) -> Result<JobDescriptor, QueueError> {
    pbs::render(process, first_point, batch, shared)
}

/// Runs the `queue` job: checks that all gridded inputs share
/// the domain grid and writes one PBS script per batch to `outdir`.
pub fn run(settings: &Queue) -> Result<(), ToolError> {
    prepare_output_dir(&settings.outdir)?;

    info!("Reading inputs");
    let domain = Dataset::open(&settings.domain)?;
    let baseflow = Dataset::open(&settings.baseflow)?;
    let parameters = Dataset::open(&settings.parameters)?;

    let mask = Grid::from_dataset(&domain, MASK_VAR)?;
    check_same_grid(&mask, &baseflow, "baseflow file")?;
    check_same_grid(&mask, &parameters, "parameter file")?;

    let metadata = RunMetadata::from_dataset(&baseflow)?;
    let period = SimulationPeriod::from_dataset(&baseflow)?;

    debug!(
        "Run {} with simulation period {} to {} ({} calendar)",
        metadata.case_string(),
        period.start,
        period.end,
        period.calendar_name
    );

    let items: Vec<WorkItem> = enumerate_domain_cells(&mask)
        .into_iter()
        .map(|cell| build_work_item(cell, &mask, &metadata))
        .collect();

    if items.is_empty() {
        warn!("Domain has no cells with positive mask, no jobs written");
        return Ok(());
    }

    let batches = partition(&items, settings.batch_size);
    let shared = SharedConfig::new(settings, metadata, period);

    let mut point = 0;

    for (process, batch) in batches.iter().enumerate() {
        let job = emit_batch_descriptor(process, point, batch, &shared)?;

        debug!(
            "Writing job {} to {} with {} points",
            job.process,
            job.file_name,
            job.case_ids.len()
        );
        fs::write(settings.outdir.join(&job.file_name), &job.script)?;

        point += batch.len();
    }

    info!(
        "Wrote {} job scripts for {} domain cells to {}",
        batches.len(),
        items.len(),
        settings.outdir.display()
    );

    Ok(())
}
