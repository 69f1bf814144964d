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

//! VIC flow direction codes.
//!
//! Codes 1 to 8 point clockwise from north to one of the
//! neighbouring cells, 9 marks an outlet and 0 a cell without routing.

use crate::constants::OUTLET_CODE;
use crate::{errors::GridError, Float};

/// Offsets `(lat, lon)` of each code when both axes are increasing.
const BASE_OFFSETS: [(isize, isize); 10] = [
    (0, 0),   // no routing
    (1, 0),   // north
    (1, 1),   // northeast
    (0, 1),   // east
    (-1, 1),  // southeast
    (-1, 0),  // south
    (-1, -1), // southwest
    (0, -1),  // west
    (1, -1),  // northwest
    (0, 0),   // outlet
];

/// Index offsets `(row, col)` for each direction code
/// adjusted to the storage order of a specific grid.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct DirectionTable {
    offsets: [(isize, isize); 10],
}

impl DirectionTable {
    /// Only signs of the steps matter, so that north always
    /// points towards increasing latitude.
    pub fn build(lat_step: Float, lon_step: Float) -> Result<Self, GridError> {
        if lat_step == 0.0 || lon_step == 0.0 || lat_step.is_nan() || lon_step.is_nan() {
            return Err(GridError::ZeroStep);
        }

        let lat_dir = lat_step.signum() as isize;
        let lon_dir = lon_step.signum() as isize;

        let mut offsets = BASE_OFFSETS;

        for offset in &mut offsets {
            *offset = (offset.0 * lat_dir, offset.1 * lon_dir);
        }

        Ok(DirectionTable { offsets })
    }

    pub fn offset(&self, code: u8) -> Option<(isize, isize)> {
        self.offsets.get(usize::from(code)).copied()
    }
}

/// Reads a direction code from a grid value,
/// `None` when the value is not an integer in `0..=9`.
pub fn direction_code(value: Float) -> Option<u8> {
    if value.fract() != 0.0 || !(0.0..=OUTLET_CODE as Float).contains(&value) {
        return None;
    }

    Some(value as u8)
}
