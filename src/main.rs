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

//! Flowroute is a set of batch tools working on flow-direction
//! grids of the VIC hydrology model and on the RVIC streamflow
//! routing workflow built around them.
//!
//! A single run executes one job selected in the configuration file:
//!
//! - `mouths` finds the grid cell where each watershed drains,
//! - `queue` splits a routing domain into PBS batch jobs,
//! - `reassemble` merges per-cell routing results back into one grid,
//! - `audit` checks a results directory for missing batch outputs.

mod constants;
mod errors;
mod routing;

use cap::Cap;
use env_logger::Env;
use log::{error, info};
use std::{alloc, env, path::PathBuf, process};

type Float = f64;

/// Global allocator used by the tools.
///
/// Use of static global allocator allows for capping the memory to the limit set by user
/// in configuration file and in effect provide better [OOM error](https://en.wikipedia.org/wiki/Out_of_memory) handling.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// The main program function.
/// Prepares the runtime environment and calls the [`routing::main`].
///
/// The `env_logger` needs to be initiated before any log messages
/// are possible to occur, including those from configuration parsing.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("FLOWROUTE_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("FLOWROUTE_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    let config_path = env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("config.yaml"), PathBuf::from);

    match routing::main(&config_path) {
        Ok(_) => info!("Job finished. Check the output files and log."),
        Err(err) => {
            error!("Job failed with error: {}", err);
            process::exit(1);
        }
    }
}
