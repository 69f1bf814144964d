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

//! Module with the regular lon-lat grid shared by all jobs.
//!
//! Rows of the grid follow the latitude axis and columns
//! the longitude axis, both axes must be evenly spaced but
//! can be stored in any order. Conversions between grid indices
//! and coordinates use cell centres.

mod direction;

pub use self::direction::{direction_code, DirectionTable};

use crate::constants::{COORD_REL_TOLERANCE, LAT_NAME, LON_NAME};
use crate::routing::dataset::Dataset;
use crate::{errors::GridError, Float};
use float_cmp::approx_eq;
use ndarray::Array2;

/// Convenience type to store lon-lat coordinates.
pub type LonLat<T> = (T, T);

/// Index of a grid cell.
///
/// In RVIC and in the routing scripts `y` is the latitude (row) index
/// and `x` the longitude (column) index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Cell { row, col }
    }

    pub fn x(&self) -> usize {
        self.col
    }

    pub fn y(&self) -> usize {
        self.row
    }
}

/// Evenly spaced coordinate axis.
///
/// A single point axis has a zero step, such grids can be
/// partitioned and reassembled but not routed.
#[derive(Clone, PartialEq, Debug)]
struct Axis {
    values: Vec<Float>,
    step: Float,
}

impl Axis {
    fn new(values: Vec<Float>) -> Result<Self, GridError> {
        if values.is_empty() {
            return Err(GridError::IrregularAxis("axis must have at least one point"));
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(GridError::IrregularAxis("axis values must be finite"));
        }

        if values.len() == 1 {
            return Ok(Axis { values, step: 0.0 });
        }

        let step = (values[values.len() - 1] - values[0]) / (values.len() - 1) as Float;

        if step == 0.0 {
            return Err(GridError::ZeroStep);
        }

        let tolerance = step.abs() * COORD_REL_TOLERANCE;

        for pair in values.windows(2) {
            let diff = pair[1] - pair[0];

            if diff.signum() != step.signum() {
                return Err(GridError::IrregularAxis("axis is not strictly monotonic"));
            }

            if !approx_eq!(Float, diff, step, epsilon = tolerance) {
                return Err(GridError::IrregularAxis("axis is not evenly spaced"));
            }
        }

        Ok(Axis { values, step })
    }

    /// Absolute tolerance of coordinate comparisons.
    fn tolerance(&self) -> Float {
        if self.step == 0.0 {
            self.values[0].abs().max(1.0) * COORD_REL_TOLERANCE
        } else {
            self.step.abs() * COORD_REL_TOLERANCE
        }
    }

    /// Index of the nearest point, `None` when the value is
    /// further than half a step outside the axis.
    /// A single point axis only covers its own coordinate.
    fn index_of(&self, value: Float) -> Option<usize> {
        if self.step == 0.0 {
            return approx_eq!(Float, value, self.values[0], epsilon = self.tolerance())
                .then(|| 0);
        }

        let position = (value - self.values[0]) / self.step;
        let last = (self.values.len() - 1) as Float;

        if !position.is_finite() || position < -0.5 || position > last + 0.5 {
            return None;
        }

        Some(position.round().clamp(0.0, last) as usize)
    }

    fn matches(&self, other: &Axis) -> bool {
        let tolerance = self.tolerance();

        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| approx_eq!(Float, *a, *b, epsilon = tolerance))
    }
}

/// Rectangular grid of scalar values with per-cell mask.
#[derive(Clone, PartialEq, Debug)]
pub struct Grid {
    values: Array2<Float>,
    mask: Array2<bool>,
    lats: Axis,
    lons: Axis,
}

impl Grid {
    /// Builds the grid from coordinates and values indexed `[lat, lon]`,
    /// masked cells are `None`.
    pub fn new(
        lats: Vec<Float>,
        lons: Vec<Float>,
        values: Array2<Option<Float>>,
    ) -> Result<Self, GridError> {
        let lats = Axis::new(lats)?;
        let lons = Axis::new(lons)?;

        if values.dim() != (lats.values.len(), lons.values.len()) {
            return Err(GridError::IncorrectShape(format!(
                "values have shape {:?} but axes have lengths ({}, {})",
                values.dim(),
                lats.values.len(),
                lons.values.len()
            )));
        }

        let mask = values.mapv(|v| v.is_none());
        let values = values.mapv(|v| v.unwrap_or_default());

        Ok(Grid {
            values,
            mask,
            lats,
            lons,
        })
    }

    /// Reads a `(lat, lon)` variable and its coordinate variables from dataset.
    pub fn from_dataset(dataset: &Dataset, var_name: &str) -> Result<Self, GridError> {
        let dimensions = dataset.dimensions_of(var_name)?;

        if dimensions != [LAT_NAME, LON_NAME] {
            return Err(GridError::IncorrectShape(format!(
                "{} has dimensions {:?}, expected [{}, {}]",
                var_name, dimensions, LAT_NAME, LON_NAME
            )));
        }

        let lats = read_axis(dataset, LAT_NAME)?;
        let lons = read_axis(dataset, LON_NAME)?;
        let shape = (lats.len(), lons.len());

        let values = Array2::from_shape_vec(shape, dataset.read_values(var_name)?)
            .map_err(|err| GridError::IncorrectShape(err.to_string()))?;

        Grid::new(lats, lons, values)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Latitude step, zero for a single row.
    pub fn lat_step(&self) -> Float {
        self.lats.step
    }

    pub fn lon_step(&self) -> Float {
        self.lons.step
    }

    /// Length of the shorter side of a cell, in degrees.
    pub fn cell_size(&self) -> Float {
        self.lats.step.abs().min(self.lons.step.abs())
    }

    /// Nearest cell to given coordinates.
    pub fn lonlat_to_xy(&self, lonlat: LonLat<Float>) -> Result<Cell, GridError> {
        let (lon, lat) = lonlat;

        match (self.lats.index_of(lat), self.lons.index_of(lon)) {
            (Some(row), Some(col)) => Ok(Cell::new(row, col)),
            _ => Err(GridError::NotCovered(lon, lat)),
        }
    }

    /// Coordinates of the cell centre. Panics on index out of bounds.
    pub fn xy_to_lonlat(&self, cell: Cell) -> LonLat<Float> {
        (self.lons.values[cell.col], self.lats.values[cell.row])
    }

    pub fn is_valid_index(&self, row: isize, col: isize) -> bool {
        let (rows, cols) = self.shape();

        row >= 0 && col >= 0 && (row as usize) < rows && (col as usize) < cols
    }

    /// Cell value and whether it is masked.
    pub fn value_at(&self, cell: Cell) -> (Float, bool) {
        let index = [cell.row, cell.col];
        (self.values[index], self.mask[index])
    }

    /// All cells with unmasked value greater than zero, in row-major order.
    pub fn positive_cells(&self) -> Vec<Cell> {
        self.values
            .indexed_iter()
            .filter(|&((row, col), value)| !self.mask[[row, col]] && *value > 0.0)
            .map(|((row, col), _)| Cell::new(row, col))
            .collect()
    }
}

fn read_axis(dataset: &Dataset, name: &str) -> Result<Vec<Float>, GridError> {
    dataset
        .read_values(name)?
        .into_iter()
        .map(|v| v.ok_or(GridError::IrregularAxis("coordinate values cannot be masked")))
        .collect()
}

/// Checks that the coordinates of a dataset match the grid,
/// `name` identifies the dataset in errors.
pub fn check_same_grid(grid: &Grid, dataset: &Dataset, name: &str) -> Result<(), GridError> {
    let lats = Axis::new(read_axis(dataset, LAT_NAME)?)?;
    let lons = Axis::new(read_axis(dataset, LON_NAME)?)?;

    if !grid.lats.matches(&lats) {
        return Err(GridError::Mismatch(name.to_string(), "latitudes"));
    }

    if !grid.lons.matches(&lons) {
        return Err(GridError::Mismatch(name.to_string(), "longitudes"));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{check_same_grid, Cell, DirectionTable, Grid};
    use crate::errors::GridError;
    use crate::routing::dataset::{tests::write_grid, Dataset};
    use crate::Float;
    use float_cmp::approx_eq;
    use ndarray::Array2;

    /// Grid with all cells set to given values, `None` is masked.
    pub(crate) fn grid_from(
        lats: &[Float],
        lons: &[Float],
        values: &[Option<Float>],
    ) -> Grid {
        let values = Array2::from_shape_vec((lats.len(), lons.len()), values.to_vec()).unwrap();
        Grid::new(lats.to_vec(), lons.to_vec(), values).unwrap()
    }

    #[test]
    fn coordinates_conversion() {
        let grid = grid_from(
            &[50.0, 49.5, 49.0],
            &[-120.0, -119.5],
            &[Some(1.0); 6],
        );

        assert!(approx_eq!(Float, grid.lat_step(), -0.5));
        assert!(approx_eq!(Float, grid.lon_step(), 0.5));

        assert_eq!(grid.lonlat_to_xy((-119.6, 49.1)).unwrap(), Cell::new(2, 1));
        assert_eq!(grid.lonlat_to_xy((-120.2, 50.2)).unwrap(), Cell::new(0, 0));
        assert_eq!(grid.xy_to_lonlat(Cell::new(1, 1)), (-119.5, 49.5));

        for row in 0..3 {
            for col in 0..2 {
                let cell = Cell::new(row, col);
                assert_eq!(grid.lonlat_to_xy(grid.xy_to_lonlat(cell)).unwrap(), cell);
            }
        }
    }

    #[test]
    fn outside_points_not_covered() {
        let grid = grid_from(&[0.0, 1.0], &[0.0, 1.0], &[Some(1.0); 4]);

        assert!(matches!(
            grid.lonlat_to_xy((1.6, 0.5)),
            Err(GridError::NotCovered(_, _))
        ));
        assert!(matches!(
            grid.lonlat_to_xy((0.5, -0.6)),
            Err(GridError::NotCovered(_, _))
        ));
        assert!(grid.lonlat_to_xy((1.4, -0.4)).is_ok());
    }

    #[test]
    fn irregular_axes_rejected() {
        let values = Array2::from_elem((3, 2), Some(1.0));

        let uneven = Grid::new(vec![0.0, 1.0, 3.0], vec![0.0, 1.0], values.clone());
        assert!(matches!(uneven, Err(GridError::IrregularAxis(_))));

        let zigzag = Grid::new(vec![0.0, 1.0, 0.0], vec![0.0, 1.0], values.clone());
        assert!(matches!(zigzag, Err(GridError::ZeroStep)));

        let empty = Grid::new(vec![0.0, 1.0, 2.0], vec![], Array2::from_elem((3, 0), None));
        assert!(matches!(empty, Err(GridError::IrregularAxis(_))));

        let wrong_shape = Grid::new(vec![0.0, 1.0], vec![0.0, 1.0], values);
        assert!(matches!(wrong_shape, Err(GridError::IncorrectShape(_))));
    }

    #[test]
    fn index_validity_and_values() {
        let grid = grid_from(
            &[0.0, 1.0],
            &[0.0, 1.0, 2.0],
            &[Some(1.0), None, Some(0.0), Some(2.0), Some(-1.0), Some(3.0)],
        );

        assert!(grid.is_valid_index(1, 2));
        assert!(!grid.is_valid_index(2, 0));
        assert!(!grid.is_valid_index(0, -1));

        assert_eq!(grid.value_at(Cell::new(0, 0)), (1.0, false));
        assert!(grid.value_at(Cell::new(0, 1)).1);

        assert_eq!(
            grid.positive_cells(),
            vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(1, 2)]
        );
    }

    #[test]
    fn single_row_grid() {
        let grid = grid_from(&[55.0], &[-121.0, -120.5, -120.0], &[Some(1.0); 3]);

        assert_eq!(grid.shape(), (1, 3));
        assert_eq!(grid.lat_step(), 0.0);
        assert!(approx_eq!(Float, grid.lon_step(), 0.5));
        assert_eq!(grid.positive_cells().len(), 3);

        assert_eq!(grid.lonlat_to_xy((-120.4, 55.0)).unwrap(), Cell::new(0, 1));
        assert!(matches!(
            grid.lonlat_to_xy((-120.4, 55.2)),
            Err(GridError::NotCovered(_, _))
        ));
        assert_eq!(grid.xy_to_lonlat(Cell::new(0, 2)), (-120.0, 55.0));

        assert!(matches!(
            DirectionTable::build(grid.lat_step(), grid.lon_step()),
            Err(GridError::ZeroStep)
        ));
    }

    #[test]
    fn single_point_axes_compared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domain.nc");
        write_grid(&path, &[55.0], &[-121.0, -120.5, -120.0], "mask", &[Some(1); 3]);

        let dataset = Dataset::open(&path).unwrap();
        let grid = Grid::from_dataset(&dataset, "mask").unwrap();
        assert!(check_same_grid(&grid, &dataset, "domain").is_ok());

        let other = grid_from(&[55.5], &[-121.0, -120.5, -120.0], &[Some(1.0); 3]);
        assert!(matches!(
            check_same_grid(&other, &dataset, "domain"),
            Err(GridError::Mismatch(_, "latitudes"))
        ));
    }
}
