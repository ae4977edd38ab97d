use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::info;

use crate::UserConfig;
use crate::data::OsmMapData;
use crate::data::document::OsmDocument;
use crate::errors::{Error, ErrorKind, Result};
use crate::repair::{repair_document, RepairReport};
use crate::repair::duplicates::{find_duplicate_way_sets, DuplicateClass};

use super::export_duplicates::{self, export_duplicates};
use super::parse_osm::{build_map_data, osm_stem, read_document};
use super::Etl;

pub const ETL_NAME: &str = "repair_osm";
pub const REPAIRED_FILE_SUFFIX: &str = "_repaired.osm";

pub struct Input {
    document: OsmDocument,
    data: OsmMapData,
}

pub struct Output {
    data: OsmMapData,
    classes: Vec<DuplicateClass>,
    /// `None` when there was nothing to repair.
    repaired: Option<OsmDocument>,
    report: RepairReport,
}

pub struct RepairOsmEtl<'a> {
    config: &'a UserConfig,
    input_path: PathBuf,
    report: Option<RepairReport>,
}

impl RepairOsmEtl<'_> {
    pub fn new<'a>(config: &'a UserConfig, input_path: &Path) -> RepairOsmEtl<'a> {
        RepairOsmEtl {
            config,
            input_path: input_path.to_path_buf(),
            report: None,
        }
    }

    /// Summary of the last successful run.
    pub fn report(&self) -> Option<&RepairReport> {
        self.report.as_ref()
    }

    fn stem(&self) -> Result<&str> {
        osm_stem(&self.input_path).ok_or_else(|| Error::new(
            ErrorKind::InvalidInput,
            format!("{} is not a .osm file", self.input_path.display()),
        ))
    }

    pub fn duplicate_ways_path(&self, dir: &Path) -> Result<PathBuf> {
        Ok(dir.join(format!("{}{}", self.stem()?, export_duplicates::OUTPUT_FILE_SUFFIX)))
    }

    pub fn repaired_path(&self, dir: &Path) -> Result<PathBuf> {
        Ok(dir.join(format!("{}{}", self.stem()?, REPAIRED_FILE_SUFFIX)))
    }

    fn write_document(document: &OsmDocument, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        document.write(BufWriter::new(file))
    }
}

impl Etl for RepairOsmEtl<'_> {
    type Input = Input;
    type Output = Output;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(self.config.skip_existing && self.repaired_path(dir)?.try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        for path in [self.duplicate_ways_path(dir)?, self.repaired_path(dir)?] {
            if path.try_exists()? {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        let document = read_document(&self.input_path)?;
        let data = build_map_data(&document)
            .map_err(|err| err.context(self.input_path.display()))?;
        info!(nodes = data.nodes.len(), ways = data.ways.len(); "Built document model");
        Ok(Input {
            document,
            data,
        })
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let Input { mut document, data } = input;

        let classes = find_duplicate_way_sets(data.way_nodes());
        info!(duplicate_sets = classes.len(); "Identified duplicate geometries");
        if classes.is_empty() {
            return Ok(Output {
                data,
                classes,
                repaired: None,
                report: RepairReport::default(),
            });
        }

        let report = repair_document(&mut document, &data, &classes)
            .map_err(|err| err.context("Error repairing OSM file"))?;
        Ok(Output {
            data,
            classes,
            repaired: Some(document),
            report,
        })
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let repaired = match output.repaired {
            Some(repaired) => repaired,
            None => {
                let input = self.input_path.display().to_string();
                info!(input = input.as_str(); "No duplicate way sets found");
                self.report = Some(output.report);
                return Ok(());
            },
        };

        fs::create_dir_all(dir)?;
        let duplicate_ways_path = self.duplicate_ways_path(dir)?;
        let features = export_duplicates(&output.data, &output.classes, &duplicate_ways_path)?;
        let path = duplicate_ways_path.display().to_string();
        info!(features = features, path = path.as_str(); "Exported duplicate ways");

        let repaired_path = self.repaired_path(dir)?;
        Self::write_document(&repaired, &repaired_path)
            .map_err(|err| err.context(format!("Error writing {}", repaired_path.display())))?;
        let path = repaired_path.display().to_string();
        info!(path = path.as_str(); "Wrote repaired document");

        self.report = Some(output.report);
        Ok(())
    }
}
