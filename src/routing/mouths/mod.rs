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

//! Module finding the mouths of watersheds.
//!
//! For every watershed polygon the routing is followed cell by cell
//! from a point inside the polygon, along the VIC flow directions,
//! until an outlet cell (direction code 9) is reached. The outlet is
//! the mouth of the watershed.
//!
//! The routing is abandoned without a mouth when it reaches a masked
//! cell, visits a cell for the second time (cyclic routing data) or leaves
//! the watershed or the grid. Such watersheds are only reported in the log,
//! as every watershed is traced independently.

pub mod watershed;

use self::watershed::{load_watersheds, Watershed};
use super::{configuration::Mouths, progress_bar, Core};
use crate::constants::NO_DATA_CODE;
use crate::errors::{ToolError, TraceError};
use crate::routing::dataset::Dataset;
use crate::routing::grid::{direction_code, Cell, DirectionTable, Grid, LonLat};
use crate::Float;
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use std::sync::{mpsc, Arc};

/// Follows the flow directions from `start` to an outlet.
///
/// `within` decides if the routing can continue to a cell
/// with given centre coordinates.
pub fn trace_outlet<F>(
    grid: &Grid,
    table: &DirectionTable,
    start: Cell,
    within: F,
) -> Result<Cell, TraceError>
where
    F: Fn(LonLat<Float>) -> bool,
{
    let mut visited: FxHashSet<Cell> = FxHashSet::default();
    let mut current = start;
    visited.insert(current);

    loop {
        let (value, masked) = grid.value_at(current);

        if masked {
            return Err(TraceError::Masked(current.row, current.col));
        }

        let (d_row, d_col) = direction_code(value)
            .and_then(|code| table.offset(code))
            .ok_or(TraceError::InvalidCode(value, current.row, current.col))?;

        if value as i64 == NO_DATA_CODE {
            return Err(TraceError::Masked(current.row, current.col));
        }

        // outlets point to themselves
        if (d_row, d_col) == (0, 0) {
            return Ok(current);
        }

        let row = current.row as isize + d_row;
        let col = current.col as isize + d_col;

        if !grid.is_valid_index(row, col) {
            return Err(TraceError::LeftGrid(current.row, current.col));
        }

        let neighbour = Cell::new(row as usize, col as usize);

        if visited.contains(&neighbour) {
            return Err(TraceError::Cycle(neighbour.row, neighbour.col));
        }

        if !within(grid.xy_to_lonlat(neighbour)) {
            return Err(TraceError::LeftWatershed(current.row, current.col));
        }

        visited.insert(neighbour);
        current = neighbour;
    }
}

/// Finds the mouth cell of one watershed.
pub fn find_mouth(
    grid: &Grid,
    table: &DirectionTable,
    watershed: &Watershed,
    inset: Float,
) -> Result<Cell, TraceError> {
    let start = watershed
        .start_point(inset)
        .ok_or(TraceError::NoStartPoint)?;

    let start_cell = grid
        .lonlat_to_xy(start)
        .map_err(|_| TraceError::NotCovered(start.0, start.1))?;

    trace_outlet(grid, table, start_cell, |lonlat| watershed.contains(lonlat))
}

/// Mouth of a watershed as written to the output.
#[derive(Clone, PartialEq, Debug)]
pub struct Mouth {
    pub lon: Float,
    pub lat: Float,
    pub key: String,
}

/// Runs the `mouths` job: traces all watersheds on the threadpool
/// and writes the found mouths to CSV, in the order of input features.
pub fn run(core: &Core, settings: &Mouths) -> Result<(), ToolError> {
    info!("Reading flow direction grid");
    let dataset = Dataset::open(&settings.direction_file)?;
    let grid = Grid::from_dataset(&dataset, &settings.direction_var)?;
    let table = DirectionTable::build(grid.lat_step(), grid.lon_step())?;
    let inset = settings.inset_fraction * grid.cell_size();

    debug!(
        "Flow direction grid has shape {:?} and steps lat: {} lon: {}",
        grid.shape(),
        grid.lat_step(),
        grid.lon_step()
    );

    info!("Reading watersheds");
    let watersheds = load_watersheds(&settings.watersheds, &settings.key_property)?;
    let watersheds_count = watersheds.len();

    let grid = Arc::new(grid);
    let bar = progress_bar(watersheds_count as u64, "Traced watersheds");

    // deploy watersheds on to the threadpool
    let (tx, rx) = mpsc::channel();

    for (index, watershed) in watersheds.into_iter().enumerate() {
        let tx = tx.clone();
        let grid = Arc::clone(&grid);

        core.threadpool.spawn(move || {
            let result = find_mouth(&grid, &table, &watershed, inset);
            // the receiver lives until all senders are dropped
            let _ = tx.send((index, watershed.key, result.map(|cell| grid.xy_to_lonlat(cell))));
        });
    }

    drop(tx);

    let mut mouths: Vec<(usize, Mouth)> = Vec::with_capacity(watersheds_count);

    for (index, key, result) in rx.iter() {
        match result {
            Ok((lon, lat)) => mouths.push((index, Mouth { lon, lat, key })),
            Err(err) => warn!("No mouth found for watershed {}: {}", key, err),
        }
        bar.inc(1);
    }

    bar.finish_with_message("All watersheds traced");

    mouths.sort_by_key(|(index, _)| *index);
    let mouths: Vec<Mouth> = mouths.into_iter().map(|(_, mouth)| mouth).collect();

    info!(
        "Found mouths of {} out of {} watersheds",
        mouths.len(),
        watersheds_count
    );

    save_mouths(&mouths, settings)?;

    Ok(())
}

fn save_mouths(mouths: &[Mouth], settings: &Mouths) -> Result<(), ToolError> {
    let mut out_file = csv::Writer::from_path(&settings.output)?;

    out_file.write_record(&["lon", "lat", settings.key_property.as_str()])?;

    for mouth in mouths {
        out_file.write_record(&[mouth.lon.to_string(), mouth.lat.to_string(), mouth.key.clone()])?;
    }

    out_file.flush()?;

    Ok(())
}
