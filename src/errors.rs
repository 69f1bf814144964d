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

use crate::Float;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Error while reading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Error while handling gridded dataset: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Error in grid structure: {0}")]
    Grid(#[from] GridError),

    #[error("Error while reading watersheds: {0}")]
    Watershed(#[from] WatershedError),

    #[error("Error while preparing batch jobs: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error while writing CSV output: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid file name pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Cannot set memory limit of {0} MB")]
    MemoryLimit(usize),

    #[error("Faulty output location: {0}")]
    FaultyOutput(&'static str),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open configuration file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize configuration file: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("netCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("Variable {0} not found")]
    MissingVariable(String),

    #[error("Dimension {0} not found")]
    MissingDimension(String),

    #[error("Attribute {0} not found")]
    MissingAttribute(String),

    #[error("Variable {0} has data inconsistent with its shape")]
    IncorrectShape(String),

    #[error("Unexpected value type in {0}")]
    IncorrectType(String),
}

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Irregular coordinate axis: {0}")]
    IrregularAxis(&'static str),

    #[error("Coordinate step cannot be zero")]
    ZeroStep,

    #[error("Point lon: {0:.4} lat: {1:.4} is not covered by the grid")]
    NotCovered(Float, Float),

    #[error("Grid variable has incorrect shape: {0}")]
    IncorrectShape(String),

    #[error("Grid of {0} does not match the domain: {1} differ")]
    Mismatch(String, &'static str),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

#[derive(Error, Debug)]
pub enum WatershedError {
    #[error("Cannot open watersheds file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot parse GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Feature has no geometry")]
    MissingGeometry,

    #[error("Feature geometry is not polygonal")]
    NotPolygonal,

    #[error("Feature has no usable {0} property")]
    MissingKey(String),
}

/// Reasons for which a single watershed has no mouth.
///
/// These never stop the job, they are logged and
/// the watershed is left out of the output.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum TraceError {
    #[error("no starting point inside the watershed")]
    NoStartPoint,

    #[error("starting point lon: {0:.4} lat: {1:.4} is not covered by the grid")]
    NotCovered(Float, Float),

    #[error("routing reached a masked cell x: {1} y: {0}")]
    Masked(usize, usize),

    #[error("invalid direction code {0} in cell x: {2} y: {1}")]
    InvalidCode(Float, usize, usize),

    #[error("routing contains a cycle through cell x: {1} y: {0}")]
    Cycle(usize, usize),

    #[error("routing left the watershed after cell x: {1} y: {0}")]
    LeftWatershed(usize, usize),

    #[error("routing left the grid after cell x: {1} y: {0}")]
    LeftGrid(usize, usize),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Time units {0} are not of the form 'days since YYYY-MM-DD'")]
    TimeUnits(String),

    #[error("Calendar {0} is not supported")]
    UnsupportedCalendar(String),

    #[error("Date {0} does not exist in the {1} calendar")]
    InvalidDate(String, &'static str),

    #[error("Time variable is empty")]
    EmptyTime,

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Reasons for which a single routing result file
/// is not written to the assembled grid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("file not found")]
    NotFound,

    #[error("not a netCDF file")]
    WrongExtension,

    #[error("cannot read file: {0}")]
    Unreadable(String),

    #[error("no {0} dimension")]
    MissingDimension(&'static str),

    #[error("missing {0} variable")]
    MissingVariable(&'static str),

    #[error("expected one outlet per file, found {0}")]
    OutletCount(usize),

    #[error("{0} is not a valid grid index")]
    BadIndex(&'static str),

    #[error("streamflow has {found} timesteps, expected {expected}")]
    WrongLength { expected: usize, found: usize },

    #[error("x: {1}, y: {0} is not in this watershed or was already ingested")]
    UnexpectedCell(usize, usize),
}
