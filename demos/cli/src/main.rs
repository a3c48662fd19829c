use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use pcd_core::{ConverterConfig, Observation, TrendQuery};
use pcd_wire::time::{parse_device_format, to_device_format, to_storage_format};
use pcd_wire::{
    convert_observation_summary_str, convert_patient_summary_str, convert_trend_str,
    observation_to_xml_string, Rosetta,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "pcd-cli",
    about = "Convert PCD-01 query results to observations and observations to PCD-01 messages."
)]
struct Args {
    /// Directory holding rosetta_terms.xml, rosetta_harmonized.xml and rosetta_units.xml.
    /// Required by every command except `time`.
    #[arg(long, global = true)]
    rosetta_dir: Option<PathBuf>,

    /// JSON file with converter settings; missing fields keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a `<trend>` query result into observations.
    Trend {
        #[arg(short, long)]
        input: PathBuf,
        /// Observation code the trend was queried for.
        #[arg(long)]
        code: String,
        #[arg(long)]
        code_system: Option<String>,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        device: Option<String>,
    },
    /// Convert an `<ObsName>` list into observation stubs.
    ObsSummary {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Convert a `<PID>` list into patients.
    PatientSummary {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Serialize an observation (JSON) into a PCD-01 message.
    ToXml {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Normalize an HL7 device timestamp to UTC storage format.
    Time { timestamp: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pcd_wire=info".parse()?)
                .add_directive("pcd_cli=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let rosetta_dir = args.rosetta_dir.as_deref();

    match args.command {
        Command::Trend {
            input,
            code,
            code_system,
            patient,
            device,
        } => {
            let mut query = TrendQuery::new(code);
            if let Some(system) = code_system {
                query.code_system = system;
            }
            query.patient_id = patient;
            query.device_id = device;

            let rosetta = load_rosetta(rosetta_dir)?;
            let batch = convert_trend_str(&read_input(&input)?, &query, &rosetta, &config)?;
            info!(
                observations = batch.observations.len(),
                rejected = batch.rejected.len(),
                "trend converted"
            );
            println!("{}", serde_json::to_string_pretty(&batch.observations)?);
        }
        Command::ObsSummary { input } => {
            let rosetta = load_rosetta(rosetta_dir)?;
            let response = read_input(&input)?;
            let summary = convert_observation_summary_str(&response, &rosetta, &config)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::PatientSummary { input } => {
            let patients = convert_patient_summary_str(&read_input(&input)?)?;
            println!("{}", serde_json::to_string_pretty(&patients)?);
        }
        Command::ToXml { input } => {
            let observation: Observation = serde_json::from_str(&read_input(&input)?)
                .with_context(|| format!("Invalid observation JSON in {:?}", input))?;
            let rosetta = load_rosetta(rosetta_dir)?;
            println!("{}", observation_to_xml_string(&observation, &rosetta)?);
        }
        Command::Time { timestamp } => {
            let utc = parse_device_format(&timestamp)?;
            println!("{}", to_storage_format(&utc));
            println!("{}", to_device_format(&utc));
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read file {:?}", path))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ConverterConfig> {
    match path {
        Some(path) => serde_json::from_str(&read_input(path)?)
            .with_context(|| format!("Invalid converter config {:?}", path)),
        None => Ok(ConverterConfig::default()),
    }
}

fn load_rosetta(dir: Option<&Path>) -> anyhow::Result<Rosetta> {
    let dir = dir.context("--rosetta-dir is required to harmonize codes")?;
    Rosetta::load_dir(dir)
        .with_context(|| format!("Cannot load terminology tables from {:?}", dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harmonizing_commands_need_rosetta_tables() {
        let err = load_rosetta(None).unwrap_err();
        assert!(err.to_string().contains("--rosetta-dir"));
    }

    #[test]
    fn unreadable_rosetta_dir_is_fatal() {
        assert!(load_rosetta(Some(Path::new("does-not-exist"))).is_err());
    }

    #[test]
    fn rosetta_dir_is_optional_for_time_conversion() {
        let args = Args::try_parse_from(["pcd-cli", "time", "20150818130436.710"]).unwrap();
        assert!(args.rosetta_dir.is_none());
        assert!(matches!(args.command, Command::Time { .. }));
    }
}
