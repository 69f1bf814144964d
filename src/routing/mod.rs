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

//! Module containing the routing tools.
//!
//! All jobs work on a regular lon-lat grid ([`grid`]) read from netCDF
//! files ([`dataset`]). The RVIC workflow is driven in three steps:
//! the domain is split into PBS jobs routing one cell at a time ([`queue`]),
//! the outputs copied by the jobs are checked for gaps ([`audit`])
//! and finally merged into one streamflow grid ([`reassemble`]).
//! Independently of RVIC, [`mouths`] finds where watersheds drain
//! on the VIC flow direction grid.

pub mod audit;
pub mod configuration;
pub mod dataset;
pub mod grid;
pub mod mouths;
pub mod queue;
pub mod reassemble;


use crate::{errors::ToolError, ALLOCATOR};
use configuration::{Config, Job};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{fs, path::Path};

/// Main function of the tools, runs the job
/// selected in the configuration file.
pub fn main(config_path: &Path) -> Result<(), ToolError> {
    info!("Preparing the tools core");

    let core = Core::new(config_path)?;

    match &core.config.job {
        Job::Mouths(settings) => {
            info!("Finding mouths of watersheds");
            mouths::run(&core, settings)
        }
        Job::Queue(settings) => {
            info!("Preparing RVIC batch jobs");
            queue::run(settings)
        }
        Job::Reassemble(settings) => {
            info!("Reassembling RVIC streamflow");
            reassemble::run(&core, settings)
        }
        Job::Audit(settings) => {
            info!("Auditing RVIC outputs");
            audit::run(settings)
        }
    }
}

/// Structure with the configuration and resources shared by all jobs.
#[derive(Debug)]
pub struct Core {
    pub config: Config,
    pub threadpool: ThreadPool,
}

impl Core {
    /// Reads and checks the configuration, then
    /// sets the memory limit and prepares the threadpool.
    pub fn new(config_path: &Path) -> Result<Self, ToolError> {
        debug!("Reading configuration from {}", config_path.display());
        let config = Config::new_from_file(config_path)?;

        debug!("Setting memory limit");
        let memory = config.resources.memory;
        ALLOCATOR
            .set_limit(memory.saturating_mul(1024 * 1024))
            .map_err(|_| ToolError::MemoryLimit(memory))?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        Ok(Core { config, threadpool })
    }
}

/// Progress bar in the style used by all jobs.
fn progress_bar(len: u64, prefix: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    bar.set_prefix(prefix);

    bar
}

/// Makes sure that the output directory is empty,
/// so that no files of a previous run are mixed in.
fn prepare_output_dir(out_path: &Path) -> Result<(), ToolError> {
    debug!("Checking and setting output directory");

    if out_path.is_dir() {
        if out_path.read_dir()?.next().is_none() {
            debug!("Output directory exists but is empty so continuing");
        } else {
            return Err(ToolError::FaultyOutput(
                "Output directory exists and is not empty",
            ));
        }
    } else {
        debug!("Output directory does not exist so creating a new one");
        fs::create_dir_all(out_path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::prepare_output_dir;
    use crate::errors::ToolError;
    use std::fs;

    #[test]
    fn output_dir_must_be_empty() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = dir.path().join("jobs").join("peace");

        prepare_output_dir(&jobs).unwrap();
        assert!(jobs.is_dir());

        // empty directory is reused
        prepare_output_dir(&jobs).unwrap();

        fs::write(jobs.join("rvic0.pbs"), "#!/bin/bash\n").unwrap();
        assert!(matches!(
            prepare_output_dir(&jobs),
            Err(ToolError::FaultyOutput(_))
        ));
    }
}
