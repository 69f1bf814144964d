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

//! Watershed polygons read from a GeoJSON feature collection
//! (as exported by GeoServer).

use crate::routing::grid::LonLat;
use crate::{errors::WatershedError, Float};
use geo::{BoundingRect, Centroid, Contains, EuclideanDistance, InteriorPoint, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson};
use log::{debug, warn};
use serde_json::Value;
use std::{fs, iter, path::Path};

/// Start point candidates sampled along each side of the bounding box.
const SAMPLES_PER_SIDE: usize = 16;

/// Watershed area with its identifying key.
#[derive(Clone, PartialEq, Debug)]
pub struct Watershed {
    pub key: String,
    area: MultiPolygon<Float>,
}

impl Watershed {
    pub fn new(key: String, area: MultiPolygon<Float>) -> Self {
        Watershed { key, area }
    }

    /// Checks if the point lies strictly inside the watershed.
    pub fn contains(&self, lonlat: LonLat<Float>) -> bool {
        self.area.contains(&Point::new(lonlat.0, lonlat.1))
    }

    /// Point inside the watershed at least `inset` from its boundary
    /// to start the routing from.
    ///
    /// Candidates are tried in order: the centroid, the interior point
    /// and then centres of a regular sample of the bounding box.
    /// When no candidate is far enough from the boundary the one
    /// furthest from it is returned. `None` only for degenerate polygons.
    pub fn start_point(&self, inset: Float) -> Option<LonLat<Float>> {
        let inside: Vec<(Point<Float>, Float)> = self
            .candidates()
            .into_iter()
            .filter(|point| self.area.contains(point))
            .map(|point| (point, self.boundary_distance(&point)))
            .collect();

        if let Some((point, _)) = inside.iter().find(|(_, distance)| *distance >= inset) {
            return Some(point.x_y());
        }

        inside
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(point, _)| point.x_y())
    }

    fn candidates(&self) -> Vec<Point<Float>> {
        let mut points: Vec<Point<Float>> = [self.area.centroid(), self.area.interior_point()]
            .into_iter()
            .flatten()
            .collect();

        if let Some(rect) = self.area.bounding_rect() {
            let side = SAMPLES_PER_SIDE as Float;

            for i in 0..SAMPLES_PER_SIDE {
                for j in 0..SAMPLES_PER_SIDE {
                    points.push(Point::new(
                        rect.min().x + rect.width() * (i as Float + 0.5) / side,
                        rect.min().y + rect.height() * (j as Float + 0.5) / side,
                    ));
                }
            }
        }

        points
    }

    fn boundary_distance(&self, point: &Point<Float>) -> Float {
        self.area
            .0
            .iter()
            .flat_map(|polygon| iter::once(polygon.exterior()).chain(polygon.interiors()))
            .map(|ring| point.euclidean_distance(ring))
            .fold(Float::INFINITY, Float::min)
    }
}

/// Reads watersheds from GeoJSON file.
///
/// Features that cannot be used are reported and skipped,
/// only an unreadable file is an error.
pub fn load_watersheds(path: &Path, key_property: &str) -> Result<Vec<Watershed>, WatershedError> {
    debug!("Reading watersheds from {}", path.display());

    let geojson: GeoJson = fs::read_to_string(path)?.parse()?;
    let collection = FeatureCollection::try_from(geojson)?;

    let mut watersheds = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.iter().enumerate() {
        match watershed_from_feature(feature, key_property) {
            Ok(watershed) => watersheds.push(watershed),
            Err(err) => warn!("Skipping feature {}: {}", index, err),
        }
    }

    debug!(
        "Read {} of {} features as watersheds",
        watersheds.len(),
        collection.features.len()
    );

    Ok(watersheds)
}

fn watershed_from_feature(
    feature: &Feature,
    key_property: &str,
) -> Result<Watershed, WatershedError> {
    let key = match feature.property(key_property) {
        Some(Value::String(key)) => key.clone(),
        Some(Value::Number(key)) => key.to_string(),
        _ => return Err(WatershedError::MissingKey(key_property.to_string())),
    };

    let geometry = feature
        .geometry
        .as_ref()
        .ok_or(WatershedError::MissingGeometry)?;

    let area = match geo::Geometry::<Float>::try_from(&geometry.value)? {
        geo::Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        geo::Geometry::MultiPolygon(polygons) => polygons,
        _ => return Err(WatershedError::NotPolygonal),
    };

    Ok(Watershed::new(key, area))
}
