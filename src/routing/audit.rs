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

//! Quick check of the outputs copied by the batch jobs,
//! before the results are reassembled.
//!
//! RVIC case ids contain the job (process) number, so counting outputs
//! per process shows which jobs failed. Every process should produce
//! as many outputs as the fullest one, except for the last process.

use super::configuration::Audit;
use crate::errors::ToolError;
use log::{error, info, warn};
use regex::Regex;
use std::{collections::BTreeMap, fs, path::Path};

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct AuditReport {
    /// Number of outputs of each process.
    pub outputs: BTreeMap<usize, usize>,

    /// Largest number of outputs of a single process.
    pub expected: usize,

    /// Processes below the highest one without any output.
    pub missing_processes: Vec<usize>,

    /// Processes other than the last one with fewer outputs than expected.
    pub short_processes: Vec<(usize, usize)>,

    /// Entries of the directory that are not RVIC outputs.
    pub unrecognised: Vec<String>,
}

impl AuditReport {
    pub fn last_process(&self) -> Option<usize> {
        self.outputs.keys().next_back().copied()
    }

    pub fn is_complete(&self) -> bool {
        !self.outputs.is_empty()
            && self.missing_processes.is_empty()
            && self.short_processes.is_empty()
    }
}

/// Builds the report from names of the directory entries.
pub fn audit_names<'a, I>(names: I) -> Result<AuditReport, ToolError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = AuditReport::default();

    let process_finder = Regex::new(r"_process(\d+)_point")?;

    for name in names {
        let process = process_finder
            .captures(name)
            .and_then(|captures| captures[1].parse::<usize>().ok());

        match process {
            Some(process) => *report.outputs.entry(process).or_insert(0) += 1,
            None => report.unrecognised.push(name.to_string()),
        }
    }

    report.expected = report.outputs.values().copied().max().unwrap_or(0);

    if let Some(last) = report.last_process() {
        for process in 0..last {
            match report.outputs.get(&process) {
                None => report.missing_processes.push(process),
                Some(&count) if count < report.expected => {
                    report.short_processes.push((process, count))
                }
                Some(_) => (),
            }
        }
    }

    Ok(report)
}

/// Builds the report for a directory.
pub fn audit_directory(dir: &Path) -> Result<AuditReport, ToolError> {
    let mut names = vec![];

    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }

    names.sort();

    audit_names(names.iter().map(String::as_str))
}

/// Runs the `audit` job. An incomplete directory is reported
/// in the log, it is not an error.
pub fn run(settings: &Audit) -> Result<(), ToolError> {
    info!("Checking files in {}", settings.directory.display());

    let report = audit_directory(&settings.directory)?;

    for name in &report.unrecognised {
        warn!("{} is not an RVIC output", name);
    }

    let last = match report.last_process() {
        Some(last) => last,
        None => {
            error!("No RVIC data in this directory");
            return Ok(());
        }
    };

    info!("Checked {} processes", last + 1);

    for process in &report.missing_processes {
        error!("Missing all data from process {}", process);
    }

    for (process, count) in &report.short_processes {
        error!(
            "Only {} points for process {} (expected {})",
            count, process, report.expected
        );
    }

    if report.outputs[&last] < report.expected {
        info!(
            "Final process {} has only {} points",
            last, report.outputs[&last]
        );
    }

    if report.is_complete() {
        info!("No missing data found");
    } else {
        warn!("RVIC outputs are incomplete, rerun the failed jobs");
    }

    Ok(())
}
