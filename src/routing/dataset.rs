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

//! Module with read access to gridded netCDF datasets.
//!
//! Only the requested variables are read from the file, so large
//! hydrology model outputs can be opened just for their coordinates
//! and metadata. Values are read as `Float` whatever their stored type
//! and entries equal to `_FillValue` or `missing_value` are masked.
//! Variables without these attributes are masked with the netCDF default fill.

use crate::constants::{NC_FILL_FLOAT, NC_FILL_INT};
use crate::{errors::DatasetError, Float};
use netcdf::AttributeValue;
use std::path::Path;

pub struct Dataset {
    file: netcdf::File,
}

impl Dataset {
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let file = netcdf::open(path)?;

        Ok(Dataset { file })
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    fn variable(&self, name: &str) -> Result<netcdf::Variable<'_>, DatasetError> {
        self.file
            .variable(name)
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    }

    pub fn dimension(&self, name: &str) -> Result<usize, DatasetError> {
        self.file
            .dimension(name)
            .map(|dim| dim.len())
            .ok_or_else(|| DatasetError::MissingDimension(name.to_string()))
    }

    /// Names of the dimensions of a variable.
    pub fn dimensions_of(&self, name: &str) -> Result<Vec<String>, DatasetError> {
        Ok(self
            .variable(name)?
            .dimensions()
            .iter()
            .map(|dim| dim.name())
            .collect())
    }

    /// Global attribute as a string, numbers are formatted.
    pub fn attribute_string(&self, name: &str) -> Result<String, DatasetError> {
        let value = self
            .file
            .attribute(name)
            .ok_or_else(|| DatasetError::MissingAttribute(name.to_string()))?
            .value()?;

        value_to_string(value).ok_or_else(|| DatasetError::IncorrectType(name.to_string()))
    }

    /// Attribute of a variable as a string, `None` when not present.
    pub fn variable_attribute_string(
        &self,
        var_name: &str,
        name: &str,
    ) -> Result<Option<String>, DatasetError> {
        match self.variable(var_name)?.attribute(name) {
            Some(attribute) => Ok(value_to_string(attribute.value()?)),
            None => Ok(None),
        }
    }

    /// All global attributes in file order.
    pub fn attributes(&self) -> Result<Vec<(String, AttributeValue)>, DatasetError> {
        self.file
            .attributes()
            .map(|attribute| -> Result<_, DatasetError> {
                Ok((attribute.name().to_string(), attribute.value()?))
            })
            .collect()
    }

    pub fn variable_attributes(
        &self,
        var_name: &str,
    ) -> Result<Vec<(String, AttributeValue)>, DatasetError> {
        self.variable(var_name)?
            .attributes()
            .map(|attribute| -> Result<_, DatasetError> {
                Ok((attribute.name().to_string(), attribute.value()?))
            })
            .collect()
    }

    /// Reads the whole variable flattened in row-major order,
    /// with masked entries as `None`.
    pub fn read_values(&self, name: &str) -> Result<Vec<Option<Float>>, DatasetError> {
        let variable = self.variable(name)?;
        let values = variable.get_values::<Float, _>(..)?;

        let mut fill_values = vec![];

        for fill_name in ["_FillValue", "missing_value"] {
            if let Some(value) = variable.attribute_value(fill_name) {
                let value = Float::try_from(value?)
                    .map_err(|_| DatasetError::IncorrectType(format!("{}:{}", name, fill_name)))?;
                fill_values.push(value);
            }
        }

        if fill_values.is_empty() {
            fill_values = vec![NC_FILL_FLOAT, NC_FILL_INT];
        }

        Ok(values
            .into_iter()
            .map(|v| Some(v).filter(|v| !fill_values.contains(v)))
            .collect())
    }

    /// Adds a one-dimensional coordinate variable, with its dimension
    /// of the same name and its attributes, to a new file.
    pub fn copy_coordinate(
        &self,
        name: &str,
        output: &mut netcdf::FileMut,
    ) -> Result<(), DatasetError> {
        if self.dimensions_of(name)? != [name] {
            return Err(DatasetError::IncorrectShape(name.to_string()));
        }

        let values = self.variable(name)?.get_values::<Float, _>(..)?;
        let attributes = self.variable_attributes(name)?;

        output.add_dimension(name, values.len())?;
        let mut variable = output.add_variable::<Float>(name, &[name])?;

        for (attribute, value) in attributes {
            if attribute != "_FillValue" {
                variable.put_attribute(&attribute, value)?;
            }
        }

        variable.put_values(&values, ..)?;

        Ok(())
    }
}

fn value_to_string(value: AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Str(text) => Some(text),
        AttributeValue::Strs(mut texts) if texts.len() == 1 => texts.pop(),
        number => Float::try_from(number).ok().map(|v| v.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::Dataset;
    use crate::constants::{LAT_NAME, LON_NAME, TIME_NAME};
    use crate::errors::DatasetError;
    use crate::Float;
    use std::path::Path;

    /// Fill value of integer grids written by the tests.
    pub(crate) const GRID_FILL: i32 = -1;

    /// Creates a file with `lat` and `lon` coordinates and one integer
    /// `(lat, lon)` variable, `None` values are written as fill.
    /// The file stays open for further definitions until dropped.
    pub(crate) fn write_grid(
        path: &Path,
        lats: &[Float],
        lons: &[Float],
        name: &str,
        values: &[Option<i32>],
    ) -> netcdf::FileMut {
        let mut file = netcdf::create(path).unwrap();
        file.add_attribute("Conventions", "CF-1.6").unwrap();

        for (dim, coords, units) in [
            (LAT_NAME, lats, "degrees_north"),
            (LON_NAME, lons, "degrees_east"),
        ] {
            file.add_dimension(dim, coords.len()).unwrap();
            let mut variable = file.add_variable::<Float>(dim, &[dim]).unwrap();
            variable.put_attribute("units", units).unwrap();
            variable.put_values(coords, ..).unwrap();
        }

        let data: Vec<i32> = values.iter().map(|v| v.unwrap_or(GRID_FILL)).collect();

        let mut variable = file
            .add_variable::<i32>(name, &[LAT_NAME, LON_NAME])
            .unwrap();
        variable.set_fill_value(GRID_FILL).unwrap();
        variable.put_values(&data, ..).unwrap();

        file
    }

    /// Adds a `time` coordinate with CF units and calendar.
    pub(crate) fn write_time(
        file: &mut netcdf::FileMut,
        values: &[Float],
        units: &str,
        calendar: Option<&str>,
    ) {
        file.add_dimension(TIME_NAME, values.len()).unwrap();
        let mut time = file.add_variable::<Float>(TIME_NAME, &[TIME_NAME]).unwrap();
        time.put_attribute("units", units).unwrap();
        if let Some(calendar) = calendar {
            time.put_attribute("calendar", calendar).unwrap();
        }
        time.put_values(values, ..).unwrap();
    }

    fn sample(path: &Path) {
        let mut file = write_grid(
            path,
            &[49.0, 49.5],
            &[-120.0, -119.5, -119.0],
            "mask",
            &[Some(1), Some(0), None, None, Some(1), Some(1)],
        );

        file.add_attribute("downscaling_GCM_model_id", "CanESM2").unwrap();
        file.add_attribute("downscaling_GCM_realization", 1).unwrap();

        write_time(&mut file, &[0.0, 1.0], "days since 1950-01-01", None);
    }

    #[test]
    fn attributes_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.nc");
        sample(&path);

        let ds = Dataset::open(&path).unwrap();

        assert_eq!(
            ds.attribute_string("downscaling_GCM_model_id").unwrap(),
            "CanESM2"
        );
        assert_eq!(ds.attribute_string("downscaling_GCM_realization").unwrap(), "1");
        assert!(matches!(
            ds.attribute_string("history"),
            Err(DatasetError::MissingAttribute(_))
        ));
        assert_eq!(
            ds.variable_attribute_string("time", "units").unwrap().as_deref(),
            Some("days since 1950-01-01")
        );
        assert_eq!(ds.variable_attribute_string("time", "calendar").unwrap(), None);
    }

    #[test]
    fn values_are_masked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.nc");
        sample(&path);

        let ds = Dataset::open(&path).unwrap();

        assert_eq!(
            ds.read_values("mask").unwrap(),
            vec![Some(1.0), Some(0.0), None, None, Some(1.0), Some(1.0)]
        );
        assert_eq!(ds.dimensions_of("mask").unwrap(), vec!["lat", "lon"]);
        assert_eq!(ds.dimension("time").unwrap(), 2);
        assert!(matches!(
            ds.read_values("streamflow"),
            Err(DatasetError::MissingVariable(_))
        ));
        assert!(matches!(
            ds.dimension("outlets"),
            Err(DatasetError::MissingDimension(_))
        ));
    }

    #[test]
    fn coordinates_copied() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sample.nc");
        let copy = dir.path().join("copy.nc");
        sample(&source);

        let ds = Dataset::open(&source).unwrap();
        {
            let mut output = netcdf::create(&copy).unwrap();
            ds.copy_coordinate("time", &mut output).unwrap();
            ds.copy_coordinate("lon", &mut output).unwrap();
            assert!(ds.copy_coordinate("mask", &mut output).is_err());
        }

        let copied = Dataset::open(&copy).unwrap();

        assert_eq!(copied.read_values("time").unwrap(), vec![Some(0.0), Some(1.0)]);
        assert_eq!(copied.dimension("lon").unwrap(), 3);
        assert_eq!(
            copied.variable_attribute_string("lon", "units").unwrap().as_deref(),
            Some("degrees_east")
        );
    }

    #[test]
    fn other_formats_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.nc");
        std::fs::write(&path, "{\"variables\": {}}").unwrap();

        assert!(matches!(Dataset::open(&path), Err(DatasetError::Netcdf(_))));
    }
}
