use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::data::OsmMapData;
use crate::data::osm::Way;
use crate::errors::{Error, ErrorKind, Result};
use crate::repair::duplicates::DuplicateClass;

pub const OUTPUT_FILE_SUFFIX: &str = "_duplicate_ways.geojson";

#[derive(Serialize)]
struct FeatureCollection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature<'a>>,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    properties: Properties<'a>,
    geometry: Option<LineString>,
}

#[derive(Serialize)]
struct Properties<'a> {
    id: &'a str,
    has_tag: bool,
    tags: &'a str,
    duplicate_set: usize,
}

#[derive(Serialize)]
struct LineString {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: Vec<[f64; 2]>,
}

impl LineString {
    /// GeoJSON needs at least two positions for a line.
    fn from_way(way: &Way) -> Option<LineString> {
        if way.geometry.len() < 2 {
            return None;
        }
        Some(LineString {
            kind: "LineString",
            coordinates: way.geometry.iter().map(|coords| [coords.lon, coords.lat]).collect(),
        })
    }
}

fn export_error(path: &Path, message: impl std::fmt::Display) -> Error {
    Error::new(
        ErrorKind::Export,
        format!("Error exporting duplicate ways to {}: {}", path.display(), message),
    )
}

/// Writes every way of every duplicate class as a GeoJSON feature. Returns the
/// number of features written.
pub fn export_duplicates(data: &OsmMapData, classes: &[DuplicateClass], path: &Path) -> Result<usize> {
    let mut features = Vec::new();
    for (set_idx, class) in classes.iter().enumerate() {
        for way_id in &class.way_ids {
            let way = data.way(way_id)
                .ok_or_else(|| export_error(path, format!("way {} is not in the map data", way_id)))?;
            features.push(Feature {
                kind: "Feature",
                properties: Properties {
                    id: &way.id,
                    has_tag: way.has_tag,
                    tags: &way.tags,
                    duplicate_set: set_idx,
                },
                geometry: LineString::from_way(way),
            });
        }
    }
    let count = features.len();

    let collection = FeatureCollection {
        kind: "FeatureCollection",
        features,
    };
    let file = File::create(path).map_err(|err| export_error(path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &collection).map_err(|err| export_error(path, err))?;
    writer.flush().map_err(|err| export_error(path, err))?;
    Ok(count)
}
