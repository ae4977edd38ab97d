mod data;
mod errors;
mod etl;
mod repair;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{error, info};
use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::errors::{Error, ErrorKind, Result};
use crate::etl::Etl;
use crate::etl::parse_osm::{is_osm_file, osm_stem};
use crate::etl::repair_osm::RepairOsmEtl;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser)]
#[command(author, version, about = "Repairs duplicate way warnings in OpenStreetMap XML files", long_about = None)]
struct Cli {
    /// A .osm / .osm.xz file, or a directory containing them
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where to write the repaired file and the duplicate way export.
    /// Defaults to the directory of each input file.
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Write JSON logs to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Leave inputs alone whose repaired file already exists
    #[arg(long)]
    skip_existing: bool,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct UserConfig {
    pub output_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub skip_existing: bool,
}

impl UserConfig {
    /// Command line flags win over the configuration file.
    fn merge_cli(self, cli: &Cli) -> UserConfig {
        UserConfig {
            output_dir: cli.output_dir.clone().or(self.output_dir),
            log_level: cli.log_level.clone().or(self.log_level),
            log_file: cli.log_file.clone().or(self.log_file),
            skip_existing: cli.skip_existing || self.skip_existing,
        }
    }

    fn output_dir_for(&self, input: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => match input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }
}

fn load_user_config(path: &Path) -> Result<UserConfig> {
    let file = File::open(path)
        .map_err(|err| Error::new(ErrorKind::Config, format!("Could not open config file {}: {}", path.display(), err)))?;
    serde_json::from_reader(file)
        .map_err(|err| Error::from(err).context(format!("Could not parse config {}", path.display())))
}

fn setup_logging(config: &UserConfig) -> Result<()> {
    let level = config.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
    let builder = Builder::with_level(level);
    match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = File::create(path)?;
            builder.with_target_writer("*", new_writer(file)).init();
        },
        None => {
            builder.with_target_writer("*", new_writer(io::stdout())).init();
        },
    }
    Ok(())
}

/// The input itself when it is a file, or the .osm files directly inside it
/// when it is a directory, sorted by name.
fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_dir() {
        let mut inputs = Vec::new();
        for entry in input.read_dir()? {
            let path = entry?.path();
            if path.is_file() && is_osm_file(&path) {
                inputs.push(path);
            }
        }
        inputs.sort();
        if inputs.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, format!("No .osm files found in {}", input.display())));
        }
        check_output_names(&inputs)?;
        Ok(inputs)
    } else if input.is_file() {
        if !is_osm_file(input) {
            return Err(Error::new(ErrorKind::InvalidInput, format!("{} is not a .osm file", input.display())));
        }
        Ok(vec![input.to_path_buf()])
    } else {
        Err(Error::new(ErrorKind::InvalidInput, format!("{} does not exist", input.display())))
    }
}

/// `city.osm` and `city.osm.xz` would write the same output files.
fn check_output_names(inputs: &[PathBuf]) -> Result<()> {
    let mut seen: HashMap<&str, &PathBuf> = HashMap::new();
    for input in inputs {
        let stem = match osm_stem(input) {
            Some(stem) => stem,
            None => continue,
        };
        if let Some(previous) = seen.insert(stem, input) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("{} and {} would write the same output files", previous.display(), input.display()),
            ));
        }
    }
    Ok(())
}

fn repair_file(config: &UserConfig, input: &Path) -> Result<()> {
    let output_dir = config.output_dir_for(input);
    let mut etl = RepairOsmEtl::new(config, input);
    etl.process(&output_dir)?;

    match etl.report() {
        None => println!("{} is already repaired, skipping.", input.display()),
        Some(report) if report.duplicate_sets == 0 => {
            println!("No duplicate way sets found in {}.", input.display());
        },
        Some(report) => {
            println!(
                "{} has been repaired.\n{} has been created\n{} duplicate way sets ({} ways) found, {} ways removed, {} relation members redirected",
                input.display(),
                etl.repaired_path(&output_dir)?.display(),
                report.duplicate_sets,
                report.duplicate_ways,
                report.removed_ways.len(),
                report.rewritten_members,
            );
        },
    }
    Ok(())
}

/// Repairs every input in turn. A failing file does not stop the batch.
fn repair_all(config: &UserConfig, inputs: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for input in tqdm::tqdm(inputs.iter()) {
        let input_name = input.display().to_string();
        info!(input = input_name.as_str(); "Processing file");
        if let Err(err) = repair_file(config, input) {
            error!(input = input_name.as_str(), kind = err.kind.as_str(), err = err.message.as_str(); "Repair failed");
            eprintln!("error: {}: {}", input_name, err);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} files failed", failed, inputs.len()).into());
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let user_config = match &cli.config {
        Some(path) => load_user_config(path)?,
        None => UserConfig::default(),
    }.merge_cli(&cli);
    setup_logging(&user_config)?;

    let inputs = collect_inputs(&cli.input)?;
    repair_all(&user_config, &inputs)
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const DUPLICATED: &str = r#"<osm>
  <node id="1" lat="0" lon="0"/>
  <node id="2" lat="0" lon="1"/>
  <way id="1"><nd ref="1"/><nd ref="2"/></way>
  <way id="2"><nd ref="2"/><nd ref="1"/><tag k="highway" v="path"/></way>
  <relation id="3"><member type="way" ref="1" role=""/></relation>
</osm>"#;

    #[test]
    fn config_file_is_optional_per_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"output_dir": "out", "skip_existing": true}"#).unwrap();

        let config = load_user_config(&path).unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from("out")));
        assert!(config.skip_existing);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn bad_config_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_user_config(&path).unwrap_err().kind, ErrorKind::Config);
        assert_eq!(load_user_config(&dir.path().join("missing.json")).unwrap_err().kind, ErrorKind::Config);
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from(["osm-repair", "city.osm", "--output-dir", "cli-out", "--log-level", "debug"]);
        let config = UserConfig {
            output_dir: Some(PathBuf::from("file-out")),
            log_level: Some("warn".to_string()),
            log_file: Some(PathBuf::from("repair.log")),
            skip_existing: true,
        }.merge_cli(&cli);

        assert_eq!(config.output_dir, Some(PathBuf::from("cli-out")));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.log_file, Some(PathBuf::from("repair.log")));
        assert!(config.skip_existing);
    }

    #[test]
    fn output_defaults_next_to_input() {
        let config = UserConfig::default();
        assert_eq!(config.output_dir_for(Path::new("data/city.osm")), PathBuf::from("data"));
        assert_eq!(config.output_dir_for(Path::new("city.osm")), PathBuf::from("."));
    }

    #[test]
    fn collects_osm_files_from_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.osm"), DUPLICATED).unwrap();
        fs::write(dir.path().join("a.osm.xz"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("nested.osm")).unwrap();

        let inputs = collect_inputs(dir.path()).unwrap();
        let names: Vec<String> = inputs.iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.osm.xz", "b.osm"]);
    }

    #[test]
    fn rejects_unusable_inputs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        assert_eq!(collect_inputs(dir.path()).unwrap_err().kind, ErrorKind::InvalidInput);
        assert_eq!(collect_inputs(&dir.path().join("notes.txt")).unwrap_err().kind, ErrorKind::InvalidInput);
        assert_eq!(collect_inputs(&dir.path().join("missing.osm")).unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_plain_and_compressed_copies_of_one_extract() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("city.osm"), DUPLICATED).unwrap();
        fs::write(dir.path().join("city.osm.xz"), "").unwrap();
        fs::write(dir.path().join("town.osm"), DUPLICATED).unwrap();

        let err = collect_inputs(dir.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert!(err.message.contains("city.osm.xz"));
    }

    #[test]
    fn batch_continues_past_a_broken_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a_broken.osm"), "<osm><way id=\"1\">").unwrap();
        fs::write(dir.path().join("b_good.osm"), DUPLICATED).unwrap();
        let out = dir.path().join("out");

        let config = UserConfig { output_dir: Some(out.clone()), ..UserConfig::default() };
        let inputs = collect_inputs(dir.path()).unwrap();
        let err = repair_all(&config, &inputs).unwrap_err();

        assert_eq!(err.message, "1 of 2 files failed");
        assert!(out.join("b_good_repaired.osm").exists());
        assert!(out.join("b_good_duplicate_ways.geojson").exists());
        assert!(!out.join("a_broken_repaired.osm").exists());
    }
}
