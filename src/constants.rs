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

//! Module containing constants used by the tools.

use crate::Float;

/// Default fill value of netCDF `float` variables (`NC_FILL_FLOAT`).
#[allow(clippy::excessive_precision)]
pub const NC_FILL_FLOAT: Float = 9.969_209_968_386_869e36;

/// Default fill value of netCDF `int` variables (`NC_FILL_INT`).
pub const NC_FILL_INT: Float = -2_147_483_647.0;

/// Relative tolerance for comparing coordinate steps and grids.
pub const COORD_REL_TOLERANCE: Float = 1.0e-6;

/// Direction code of a cell without routing data.
pub const NO_DATA_CODE: i64 = 0;

/// Direction code of an outlet cell.
pub const OUTLET_CODE: i64 = 9;

/// Names of coordinate variables and dimensions in gridded datasets.
pub const LAT_NAME: &str = "lat";
pub const LON_NAME: &str = "lon";
pub const TIME_NAME: &str = "time";

/// Names used in RVIC single-outlet history files.
pub const OUTLETS_DIM: &str = "outlets";
pub const OUTLET_X_VAR: &str = "outlet_x_ind";
pub const OUTLET_Y_VAR: &str = "outlet_y_ind";
pub const STREAMFLOW_VAR: &str = "streamflow";

/// Variable names of the routing domain file as expected by RVIC.
pub const MASK_VAR: &str = "mask";
pub const FRACTION_VAR: &str = "frac";
pub const AREA_VAR: &str = "area";

/// Prefix of global attributes copied from the hydrology model output.
pub const HYDROMODEL_PREFIX: &str = "hydromodel__";

/// PBS job limits. RVIC needs about 25 minutes and
/// 1 GB of scratch space (plots and other artifacts) per point.
pub const MINUTES_PER_CELL: u64 = 25;
pub const BASE_SCRATCH_GB: usize = 60;
pub const JOB_VMEM_MB: usize = 12_000;
