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

//! Module responsible for parsing and checking the configuration file.
//!
//! To provide meaningful error messages. The configuration file uses
//! [YAML](https://en.wikipedia.org/wiki/YAML) and `serde` to enforce
//! strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside the configuration file so you can check this documentation
//! for more details how to set the config file.

use crate::errors::ConfigError;
use crate::Float;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Fields of the `mouths` job, which finds the outlet
/// cell of every watershed in a GeoJSON feature collection.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Mouths {
    /// netCDF file with the VIC flow direction grid.
    pub direction_file: PathBuf,

    /// _(Optional)_ Name of the flow direction variable.
    ///
    /// Defaults to `flow_direction`.
    #[serde(default = "Mouths::default_direction_var")]
    pub direction_var: String,

    /// GeoJSON feature collection with watershed polygons.
    pub watersheds: PathBuf,

    /// Feature property identifying a watershed.
    /// It is also used as the name of the third output column.
    pub key_property: String,

    /// _(Optional)_ Minimal distance of the starting point from the
    /// watershed boundary, as a fraction of the smallest grid cell side.
    ///
    /// Best effort: points are searched among the centroid, the interior
    /// point and a 16 by 16 sample of the bounding box. Watersheds without
    /// such a point start from the one furthest from the boundary.
    ///
    /// Defaults to `0.0`. Must meet the condition: `0 <= inset_fraction < 0.5`
    #[serde(default)]
    pub inset_fraction: Float,

    /// CSV file to write the mouths to.
    pub output: PathBuf,
}

impl Mouths {
    fn default_direction_var() -> String {
        "flow_direction".to_string()
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !(0.0..0.5).contains(&self.inset_fraction) {
            return Err(ConfigError::OutOfBounds(
                "Inset fraction must be in range [0, 0.5)",
            ));
        }

        if self.key_property.is_empty() {
            return Err(ConfigError::OutOfBounds("Key property cannot be empty"));
        }

        Ok(())
    }
}

/// Fields of the `queue` job, which writes PBS scripts
/// running RVIC for every cell of a routing domain.
///
/// The scripts copy the gridded inputs to the node scratch directory,
/// so all inputs must be reachable from the compute nodes.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Queue {
    /// VIC output (runoff and baseflow) used as RVIC forcing.
    /// Run metadata and simulation period are read from it.
    pub baseflow: PathBuf,

    /// Routing domain file; cells with `mask > 0` are routed.
    pub domain: PathBuf,

    /// Routing parameters file.
    pub parameters: PathBuf,

    /// Unit hydrograph file.
    pub unit_hydrograph: PathBuf,

    /// Directory to place the job scripts in.
    /// Must be empty or not exist.
    pub outdir: PathBuf,

    /// Directory the jobs copy their results and logs to.
    pub results_dir: PathBuf,

    /// Number of cells computed by one job.
    ///
    /// Cannot be smaller than `1`. Use `1` when debugging jobs.
    pub batch_size: usize,

    /// RVIC grid identifier of the watershed.
    pub watershed: String,

    /// Script sourced by each job before running RVIC,
    /// usually activating its Python environment.
    pub environment: PathBuf,
}

impl Queue {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.batch_size < 1 {
            return Err(ConfigError::OutOfBounds("Batch size cannot be less than 1"));
        }

        if self.watershed.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "Watershed grid id cannot be empty",
            ));
        }

        Ok(())
    }
}

/// Fields of the `reassemble` job, which merges per-cell
/// RVIC results into a single grid.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Reassemble {
    /// VIC output used to generate the streamflows.
    /// Provides the time axis and model metadata.
    pub baseflow: PathBuf,

    /// Routing domain file defining the expected cells.
    pub domain: PathBuf,

    /// Directory with per-cell streamflow results.
    pub streamflow_dir: PathBuf,

    /// netCDF file to write the assembled grid to.
    pub output: PathBuf,

    /// _(Optional)_ CSV file listing the cells without results.
    #[serde(default)]
    pub missing_report: Option<PathBuf>,
}

/// Fields of the `audit` job.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Audit {
    /// Directory with RVIC outputs copied by the batch jobs.
    pub directory: PathBuf,
}

/// Job to execute, selected with the `kind` field.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Mouths(Mouths),
    Queue(Queue),
    Reassemble(Reassemble),
    Audit(Audit),
}

impl Job {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        match self {
            Job::Mouths(mouths) => mouths.check_bounds(),
            Job::Queue(queue) => queue.check_bounds(),
            Job::Reassemble(_) | Job::Audit(_) => Ok(()),
        }
    }
}

/// _(Optional)_ Fields with information about
/// resources available for the tools.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used for tracing watersheds
    /// and reading result files.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit in MB.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space.
    ///
    /// Rust memory allocator aborts the program when OOM occurs
    /// and knows nothing about memory available in your system.
    /// With a capped memory amount a large assembled grid fails
    /// with an OOM error message instead of being killed
    /// by the system without any additional information.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Config {
    pub job: Job,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.job.check_bounds()?;
        config.resources.check_bounds()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, Job};
    use crate::errors::ConfigError;
    use std::path::PathBuf;

    #[test]
    fn mouths_defaults() {
        let yaml = "
job:
  kind: mouths
  direction_file: fd.nc
  watersheds: ws.geojson
  key_property: WTRSHDGRPC
  output: mouths.csv
";
        let config = Config::new_from_slice(yaml.as_bytes()).unwrap();

        match config.job {
            Job::Mouths(mouths) => {
                assert_eq!(mouths.direction_var, "flow_direction");
                assert_eq!(mouths.inset_fraction, 0.0);
                assert_eq!(mouths.output, PathBuf::from("mouths.csv"));
            }
            _ => panic!("wrong job kind"),
        }

        assert_eq!(config.resources.threads, 1);
    }

    #[test]
    fn queue_batch_size_checked() {
        let yaml = "
job:
  kind: queue
  baseflow: baseflow.nc
  domain: domain.nc
  parameters: params.nc
  unit_hydrograph: uh.csv
  outdir: jobs
  results_dir: /scratch/results
  batch_size: 0
  watershed: peace
  environment: venv/bin/activate
";
        let result = Config::new_from_slice(yaml.as_bytes());
        assert!(matches!(result, Err(ConfigError::OutOfBounds(_))));
    }

    #[test]
    fn resources_checked() {
        let yaml = "
job:
  kind: audit
  directory: results
resources:
  threads: 4
  memory: 64
";
        let result = Config::new_from_slice(yaml.as_bytes());
        assert!(matches!(result, Err(ConfigError::OutOfBounds(_))));
    }

    #[test]
    fn unknown_job_rejected() {
        let yaml = "
job:
  kind: convolve
  directory: results
";
        let result = Config::new_from_slice(yaml.as_bytes());
        assert!(matches!(result, Err(ConfigError::CantDeserialize(_))));
    }
}
