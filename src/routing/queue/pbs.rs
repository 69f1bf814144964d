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

//! Rendering of PBS job scripts running RVIC.
//!
//! Each script copies the inputs to the node scratch directory once
//! and then, for every point of the batch, writes the pour point file
//! and both RVIC configuration files with heredocs, runs the parameters
//! and convolution steps and copies the history file to the results directory.
//! Scripts depend only on their batch and the shared configuration,
//! so rendering the same batch twice gives identical text.

use super::calendar::SimulationPeriod;
use super::{RunMetadata, WorkItem};
use crate::constants::{
    AREA_VAR, BASE_SCRATCH_GB, FRACTION_VAR, JOB_VMEM_MB, LAT_NAME, LON_NAME, MASK_VAR,
    MINUTES_PER_CELL, TIME_NAME,
};
use crate::errors::QueueError;
use crate::routing::configuration::Queue;
use std::path::Path;

const CASE_DIR: &str = "$TMPDIR/rvic_output";

/// Shell expression giving the date RVIC puts into parameter file names.
const TODAY: &str = "$(date +%Y%m%d)";

/// Configuration shared by all batches of one domain.
#[derive(Clone, PartialEq, Debug)]
pub struct SharedConfig {
    pub baseflow: String,
    pub domain: String,
    pub parameters: String,
    pub unit_hydrograph: String,
    pub results_dir: String,
    pub environment: String,
    pub watershed: String,
    pub batch_size: usize,
    pub metadata: RunMetadata,
    pub period: SimulationPeriod,
}

impl SharedConfig {
    pub fn new(settings: &Queue, metadata: RunMetadata, period: SimulationPeriod) -> Self {
        fn display(path: &Path) -> String {
            path.display().to_string()
        }

        SharedConfig {
            baseflow: display(&settings.baseflow),
            domain: display(&settings.domain),
            parameters: display(&settings.parameters),
            unit_hydrograph: display(&settings.unit_hydrograph),
            results_dir: display(&settings.results_dir)
                .trim_end_matches('/')
                .to_string(),
            environment: display(&settings.environment),
            watershed: settings.watershed.clone(),
            batch_size: settings.batch_size,
            metadata,
            period,
        }
    }
}

/// Script of one batch with the RVIC case ids of its points.
#[derive(Clone, PartialEq, Debug)]
pub struct JobDescriptor {
    pub process: usize,
    pub file_name: String,
    pub case_ids: Vec<String>,
    pub script: String,
}

/// Renders the job of batch number `process`. Points are numbered
/// across batches, the first item of this batch is point `first_point`.
/// Fails when the simulation end has no following day in its calendar.
pub fn render(
    process: usize,
    first_point: usize,
    batch: &[WorkItem],
    shared: &SharedConfig,
) -> Result<JobDescriptor, QueueError> {
    let history_date = history_date(&shared.period)?;
    let mut script = Script::default();

    write_headers(&mut script, process, shared);

    script.line("cd $TMPDIR");
    script.line("mkdir rvic_output");
    script.newline();

    script.progress("Copying files to $TMPDIR");
    for input in [
        &shared.baseflow,
        &shared.domain,
        &shared.parameters,
        &shared.unit_hydrograph,
    ] {
        script.copy(input, "$TMPDIR");
    }
    script.newline();

    let mut case_ids = Vec::with_capacity(batch.len());

    for (point, item) in (first_point..).zip(batch) {
        let case_id = format!("{}_process{}_point{}", item.case_id, process, point);
        write_point(&mut script, point, item, &case_id, &history_date, shared);
        case_ids.push(case_id);
    }

    script.progress("Process completed.");

    Ok(JobDescriptor {
        process,
        file_name: format!("rvic{}.pbs", process),
        case_ids,
        script: script.text,
    })
}

fn write_headers(script: &mut Script, process: usize, shared: &SharedConfig) {
    let minutes = MINUTES_PER_CELL * shared.batch_size as u64;

    script.line("#!/bin/bash");
    script.directive("l", "nodes=1:ppn=1");
    script.directive("l", &format!("vmem={}mb", JOB_VMEM_MB));
    script.directive(
        "l",
        &format!("walltime={}:{:02}:00", minutes / 60, minutes % 60),
    );
    script.directive(
        "l",
        &format!("file={}gb", BASE_SCRATCH_GB + shared.batch_size),
    );
    script.directive("o", &format!("{}/logs/", shared.results_dir));
    script.directive("e", &format!("{}/logs/", shared.results_dir));
    script.directive("m", "a");
    script.directive("N", &format!("rvic_grid{}", process));
}

fn write_point(
    script: &mut Script,
    point: usize,
    item: &WorkItem,
    case_id: &str,
    history_date: &str,
    shared: &SharedConfig,
) {
    script.progress(&format!(
        "Generating RVIC configuration files for point {} (x: {} y: {})",
        point,
        item.cell.x(),
        item.cell.y()
    ));

    script.create_file(
        &format!("pour_points{}.txt", point),
        point,
        &[
            "lons,lats,name".to_string(),
            format!("{},{},{}", item.lon, item.lat, item.case_id),
        ],
    );

    script.create_file(
        &format!("$TMPDIR/params{}.cfg", point),
        point,
        &config_lines(&parameters_config(point, case_id, shared)),
    );

    script.create_file(
        &format!("$TMPDIR/convolve{}.cfg", point),
        point,
        &config_lines(&convolution_config(case_id, shared)),
    );

    script.progress(&format!("Running RVIC for point {}", point));
    script.line(&format!("source {}", shared.environment));
    script.progress("Generating impulse response functions");
    script.line(&format!("rvic parameters $TMPDIR/params{}.cfg", point));
    script.progress("Routing streamflow");
    script.line(&format!("rvic convolution $TMPDIR/convolve{}.cfg", point));

    script.copy(
        &format!("{}/hist/{}.rvic.h0a.{}.nc", CASE_DIR, case_id, history_date),
        &shared.results_dir,
    );
}

/// History files are named after the day following the last simulated day.
fn history_date(period: &SimulationPeriod) -> Result<String, QueueError> {
    Ok(period.end.add_days(1, period.calendar)?.to_string())
}

type Section = (&'static str, Vec<(&'static str, String)>);

fn entry(key: &'static str, value: impl ToString) -> (&'static str, String) {
    (key, value.to_string())
}

fn shared_options(case_id: &str) -> Vec<(&'static str, String)> {
    vec![
        entry("log_level", "INFO"),
        entry("verbose", "True"),
        entry("case_dir", CASE_DIR),
        entry("caseid", case_id),
    ]
}

fn domain_section(shared: &SharedConfig) -> Section {
    (
        "domain",
        vec![
            entry("file_name", scratch_path(&shared.domain)),
            entry("longitude_var", LON_NAME),
            entry("latitude_var", LAT_NAME),
            entry("land_mask_var", MASK_VAR),
            entry("fraction_var", FRACTION_VAR),
            entry("area_var", AREA_VAR),
        ],
    )
}

fn parameters_config(point: usize, case_id: &str, shared: &SharedConfig) -> Vec<Section> {
    let mut options = vec![
        entry("clean", "True"),
        entry("gridid", &shared.watershed),
        entry("temp_dir", "$TMPDIR"),
        entry("remap", "False"),
        entry("aggregate", "False"),
        entry("agg_pad", 25),
        entry("netcdf_format", "NETCDF4"),
        entry("netcdf_zlib", "False"),
        entry("netcdf_complevel", 4),
        entry("netcdf_sigfigs", "None"),
        entry("subset_days", ""),
        entry("constrain_fractions", "False"),
        entry("search_for_channel", "False"),
    ];
    options.extend(shared_options(case_id));

    vec![
        ("options", options),
        (
            "pour_points",
            vec![entry(
                "file_name",
                format!("$TMPDIR/pour_points{}.txt", point),
            )],
        ),
        (
            "uh_box",
            vec![
                entry("file_name", scratch_path(&shared.unit_hydrograph)),
                entry("header_lines", 1),
            ],
        ),
        (
            "routing",
            vec![
                entry("file_name", scratch_path(&shared.parameters)),
                entry("longitude_var", LON_NAME),
                entry("latitude_var", LAT_NAME),
                entry("flow_distance_var", "Flow_Distance"),
                entry("flow_direction_var", "Flow_Direction"),
                entry("basin_id_var", "Basin_ID"),
                entry("velocity", "velocity"),
                entry("diffusion", "diffusion"),
                entry("output_interval", 86400),
                entry("basin_flowdays", 100),
                entry("cell_flowdays", 4),
            ],
        ),
        domain_section(shared),
    ]
}

fn convolution_config(case_id: &str, shared: &SharedConfig) -> Vec<Section> {
    let period = &shared.period;

    let mut options = vec![
        entry("rvic_tag", "1.1.1"),
        entry("casestr", shared.metadata.case_string()),
        entry("calendar", &period.calendar_name),
        entry("run_type", "drystart"),
        entry("run_startdate", format!("{}-00", period.start)),
        entry("stop_option", "date"),
        entry("stop_n", -999),
        entry("stop_date", period.end),
        entry("rest_option", "date"),
        entry("rest_n", -999),
        entry("rest_date", period.end),
        entry("rest_ncform", "NETCDF4"),
    ];
    options.extend(shared_options(case_id));

    vec![
        ("options", options),
        (
            "history",
            vec![
                entry("rvichist_ntapes", 1),
                entry("rvichist_mfilt", 100000),
                entry("rvichist_ndens", 1),
                entry("rvichist_nhtfrq", 1),
                entry("rvichist_avgflag", "A"),
                entry("rvichist_outtype", "array"),
                entry("rvichist_ncform", "NETCDF4"),
                entry("rvichist_units", "m3/s"),
            ],
        ),
        domain_section(shared),
        ("initial_state", vec![entry("file_name", "None")]),
        (
            "param_file",
            vec![entry(
                "file_name",
                format!(
                    "{}/params/{}.rvic.prm.{}.{}.nc",
                    CASE_DIR, case_id, shared.watershed, TODAY
                ),
            )],
        ),
        (
            "input_forcings",
            vec![
                entry("datl_path", "$TMPDIR"),
                entry("datl_file", file_basename(&shared.baseflow)),
                entry("time_var", TIME_NAME),
                entry("latitude_var", LAT_NAME),
                entry("datl_liq_flds", "RUNOFF, BASEFLOW"),
                entry("start", "None"),
                entry("end", "None"),
            ],
        ),
    ]
}

/// INI style configuration as read by RVIC.
fn config_lines(sections: &[Section]) -> Vec<String> {
    let mut lines = vec![];

    for (name, entries) in sections {
        lines.push(format!("[{}]", name.to_uppercase()));
        lines.push("#-- ==================================== --#".to_string());

        for (key, value) in entries {
            lines.push(format!("{}: {}", key.to_uppercase(), value));
        }

        lines.push(String::new());
    }

    lines
}

fn file_basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn scratch_path(path: &str) -> String {
    format!("$TMPDIR/{}", file_basename(path))
}

#[derive(Default)]
struct Script {
    text: String,
}

impl Script {
    fn line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn newline(&mut self) {
        self.text.push('\n');
    }

    fn directive(&mut self, argument: &str, value: &str) {
        self.line(&format!("#PBS -{} {}", argument, value));
    }

    fn progress(&mut self, message: &str) {
        self.newline();
        self.line(&format!("echo $(date): {}", message));
    }

    fn copy(&mut self, file: &str, dir: &str) {
        self.progress(&format!("Copying {} to {}", file, dir));
        self.line(&format!("cp {} {}", file, dir));
    }

    /// Heredoc creating `file_name` when the job runs.
    fn create_file(&mut self, file_name: &str, point: usize, lines: &[String]) {
        let terminator = format!("EOF{}", point);

        self.progress(&format!("Creating {}", file_name));
        self.line(&format!("cat > {} << {}", file_name, terminator));

        for line in lines {
            self.line(line);
        }

        self.line(&terminator);
        self.newline();
    }
}

#[cfg(test)]
mod tests {
    use super::{config_lines, entry, file_basename, render, SharedConfig};
    use crate::errors::QueueError;
    use crate::routing::grid::Cell;
    use crate::routing::queue::calendar::{Calendar, CalendarDate, SimulationPeriod};
    use crate::routing::queue::{RunMetadata, WorkItem};

    fn shared(batch_size: usize) -> SharedConfig {
        SharedConfig {
            baseflow: "/storage/vic/baseflow.nc".to_string(),
            domain: "/storage/vic/domain.nc".to_string(),
            parameters: "/storage/vic/parameters.nc".to_string(),
            unit_hydrograph: "uh.csv".to_string(),
            results_dir: "/scratch/results".to_string(),
            environment: "/storage/venv/bin/activate".to_string(),
            watershed: "peace".to_string(),
            batch_size,
            metadata: RunMetadata {
                model: "CanESM2".to_string(),
                experiment: "rcp85".to_string(),
                run: "r1i1p1".to_string(),
            },
            period: SimulationPeriod {
                calendar_name: "365_day".to_string(),
                calendar: Calendar::NoLeap,
                start: CalendarDate { year: 1950, month: 1, day: 1 },
                end: CalendarDate { year: 2100, month: 12, day: 31 },
            },
        }
    }

    fn item(row: usize, col: usize) -> WorkItem {
        WorkItem {
            cell: Cell::new(row, col),
            lon: -120.0 + col as f64,
            lat: 55.0 + row as f64,
            case_id: format!("CanESM2_rcp85_r1i1p1_x{}_y{}", col, row),
        }
    }

    #[test]
    fn headers_scale_with_batch_size() {
        let job = render(3, 12, &[item(0, 0)], &shared(4)).unwrap();

        assert_eq!(job.file_name, "rvic3.pbs");
        assert!(job.script.starts_with("#!/bin/bash\n#PBS -l nodes=1:ppn=1\n"));
        assert!(job.script.contains("#PBS -l vmem=12000mb\n"));
        assert!(job.script.contains("#PBS -l walltime=1:40:00\n"));
        assert!(job.script.contains("#PBS -l file=64gb\n"));
        assert!(job.script.contains("#PBS -o /scratch/results/logs/\n"));
        assert!(job.script.contains("#PBS -N rvic_grid3\n"));
        assert!(job.script.contains("cp /storage/vic/domain.nc $TMPDIR\n"));
    }

    #[test]
    fn points_numbered_from_first_point() {
        let job = render(1, 2, &[item(0, 3), item(1, 0)], &shared(2)).unwrap();

        assert_eq!(
            job.case_ids,
            vec![
                "CanESM2_rcp85_r1i1p1_x3_y0_process1_point2",
                "CanESM2_rcp85_r1i1p1_x0_y1_process1_point3",
            ]
        );

        assert!(job
            .script
            .contains("cat > pour_points2.txt << EOF2\nlons,lats,name\n-117,55,CanESM2_rcp85_r1i1p1_x3_y0\nEOF2\n"));
        assert!(job.script.contains("rvic parameters $TMPDIR/params3.cfg\n"));
        assert!(job.script.contains("rvic convolution $TMPDIR/convolve3.cfg\n"));
        assert!(job.script.contains(
            "cp $TMPDIR/rvic_output/hist/CanESM2_rcp85_r1i1p1_x0_y1_process1_point3.rvic.h0a.2101-01-01.nc \
             /scratch/results\n"
        ));
        assert!(!job.script.contains("ncks"));
        assert!(job.script.ends_with("echo $(date): Process completed.\n"));
    }

    #[test]
    fn configuration_files_use_scratch_copies() {
        let job = render(0, 0, &[item(0, 0)], &shared(1)).unwrap();

        assert!(job.script.contains("FILE_NAME: $TMPDIR/domain.nc\n"));
        assert!(job.script.contains("DATL_FILE: baseflow.nc\n"));
        assert!(job.script.contains("CALENDAR: 365_day\n"));
        assert!(job.script.contains("CASESTR: CanESM2+rcp85+r1i1p1\n"));
        assert!(job.script.contains("RUN_STARTDATE: 1950-01-01-00\n"));
        assert!(job.script.contains("STOP_DATE: 2100-12-31\n"));
        assert!(job.script.contains(
            "FILE_NAME: $TMPDIR/rvic_output/params/CanESM2_rcp85_r1i1p1_x0_y0_process0_point0.rvic.prm.peace.$(date +%Y%m%d).nc\n"
        ));
    }

    #[test]
    fn rendering_is_reproducible() {
        let batch = [item(0, 0), item(0, 1)];

        assert_eq!(
            render(0, 0, &batch, &shared(2)).unwrap(),
            render(0, 0, &batch, &shared(2)).unwrap()
        );
    }

    #[test]
    fn sections_upper_cased() {
        let lines = config_lines(&[("uh_box", vec![entry("header_lines", 1)])]);

        assert_eq!(
            lines,
            vec![
                "[UH_BOX]",
                "#-- ==================================== --#",
                "HEADER_LINES: 1",
                "",
            ]
        );
        assert_eq!(file_basename("/a/b/c.nc"), "c.nc");
        assert_eq!(file_basename("c.nc"), "c.nc");
    }

    #[test]
    fn end_without_following_day_fails() {
        let mut shared = shared(1);
        shared.period.calendar_name = "standard".to_string();
        shared.period.calendar = Calendar::Standard;
        shared.period.end = CalendarDate { year: 262_143, month: 12, day: 31 };

        assert!(matches!(
            render(0, 0, &[item(0, 0)], &shared),
            Err(QueueError::InvalidDate(_, "standard"))
        ));
    }
}
