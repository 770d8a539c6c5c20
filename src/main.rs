mod cases;
mod combos;
mod error;
mod intake;
mod outcomes;
mod pipeline;
mod schema;
mod stats;
mod store;
mod surgeons;
mod table;
mod watch;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Arg, ArgMatches, Command};

use crate::outcomes::ScoringConfig;
use crate::pipeline::PipelineOptions;

// 几个子命令共用的管线参数
fn pipeline_args() -> Vec<Arg> {
    vec![
        Arg::new("data-dir")
            .long("data-dir")
            .value_name("DIR")
            .help("Directory scanned for input datasets")
            .default_value("data"),
        Arg::new("archive-dir")
            .long("archive-dir")
            .value_name("DIR")
            .help("Directory processed inputs move to")
            .default_value("archive"),
        Arg::new("summary-dir")
            .long("summary-dir")
            .value_name("DIR")
            .help("Directory summary files are written to")
            .default_value("summary_files"),
        Arg::new("db")
            .long("db")
            .value_name("FILE")
            .help("Also load written summaries into this SQLite database"),
        Arg::new("threshold")
            .long("threshold")
            .value_name("PRICE")
            .help("Surgeon price threshold override, default is the median of surgeon averages"),
        Arg::new("weights")
            .long("weights")
            .value_name("FILE")
            .help("JSON file overriding outcome score weights"),
    ]
}

fn cli() -> Command {
    Command::new("surgery-summarizer")
        .version("0.1.0")
        .about("Aggregates surgery billing datasets into case, surgeon, combination and outcome summaries")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Extract archives, process every dataset in the data directory, archive the inputs")
                .args(pipeline_args()),
        )
        .subcommand(
            Command::new("process")
                .about("Process a single dataset in place, without archiving it")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("FILE")
                        .help("Dataset to process")
                        .required(true),
                )
                .args(pipeline_args()),
        )
        .subcommand(
            Command::new("watch")
                .about("Poll the data directory and run the pipeline when new datasets arrive")
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_name("SECONDS")
                        .help("Polling interval")
                        .default_value("5"),
                )
                .args(pipeline_args()),
        )
        .subcommand(
            Command::new("load")
                .about("Load summary files into a SQLite database")
                .arg(
                    Arg::new("db")
                        .long("db")
                        .value_name("FILE")
                        .help("SQLite database path")
                        .default_value("summaries.db"),
                )
                .arg(
                    Arg::new("summary-dir")
                        .long("summary-dir")
                        .value_name("DIR")
                        .help("Directory with summary files")
                        .default_value("summary_files"),
                ),
        )
}

fn path_value(matches: &ArgMatches, name: &str, fallback: &str) -> PathBuf {
    PathBuf::from(matches.get_one::<String>(name).map(String::as_str).unwrap_or(fallback))
}

fn build_options(matches: &ArgMatches) -> anyhow::Result<PipelineOptions> {
    let threshold = match matches.get_one::<String>("threshold") {
        Some(raw) => Some(
            raw.parse::<f64>()
                .with_context(|| format!("invalid threshold: {raw}"))?,
        ),
        None => None,
    };
    let scoring = match matches.get_one::<String>("weights") {
        Some(path) => ScoringConfig::from_json_path(Path::new(path))?,
        None => ScoringConfig::default(),
    };
    Ok(PipelineOptions {
        data_dir: path_value(matches, "data-dir", "data"),
        archive_dir: path_value(matches, "archive-dir", "archive"),
        summary_dir: path_value(matches, "summary-dir", "summary_files"),
        db_path: matches.get_one::<String>("db").map(PathBuf::from),
        threshold,
        scoring,
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match cli().get_matches().subcommand() {
        Some(("run", matches)) => {
            let options = build_options(matches)?;
            pipeline::run_all(&options)?;
        }
        Some(("process", matches)) => {
            let options = build_options(matches)?;
            let input = matches
                .get_one::<String>("input")
                .map(String::as_str)
                .unwrap_or_default();
            pipeline::process_file(Path::new(input), &options)?;
        }
        Some(("watch", matches)) => {
            let options = build_options(matches)?;
            let raw = matches
                .get_one::<String>("interval")
                .map(String::as_str)
                .unwrap_or("5");
            let secs = raw
                .parse::<f64>()
                .with_context(|| format!("invalid interval: {raw}"))?;
            if !(secs > 0.0) {
                bail!("interval must be positive, got {raw}");
            }
            watch::watch(&options, Duration::from_secs_f64(secs));
        }
        Some(("load", matches)) => {
            let db = path_value(matches, "db", "summaries.db");
            let summary_dir = path_value(matches, "summary-dir", "summary_files");
            store::load_summaries(&db, &summary_dir)?;
        }
        _ => {}
    }
    Ok(())
}

// 功能测试=======================================
#[cfg(test)]
mod main_tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_build_options_defaults() {
        let matches = cli()
            .get_matches_from(["surgery-summarizer", "run"])
            .subcommand()
            .map(|(_, m)| m.clone())
            .unwrap();
        let options = build_options(&matches).unwrap();
        assert_eq!(options.data_dir, PathBuf::from("data"));
        assert_eq!(options.archive_dir, PathBuf::from("archive"));
        assert_eq!(options.summary_dir, PathBuf::from("summary_files"));
        assert_eq!(options.db_path, None);
        assert_eq!(options.threshold, None);
    }

    #[test]
    fn test_build_options_overrides() {
        let matches = cli()
            .get_matches_from([
                "surgery-summarizer",
                "run",
                "--data-dir",
                "incoming",
                "--db",
                "out.db",
                "--threshold",
                "1250.5",
            ])
            .subcommand()
            .map(|(_, m)| m.clone())
            .unwrap();
        let options = build_options(&matches).unwrap();
        assert_eq!(options.data_dir, PathBuf::from("incoming"));
        assert_eq!(options.db_path, Some(PathBuf::from("out.db")));
        assert_eq!(options.threshold, Some(1250.5));
    }

    #[test]
    fn test_bad_threshold_is_rejected() {
        let matches = cli()
            .get_matches_from(["surgery-summarizer", "run", "--threshold", "cheap"])
            .subcommand()
            .map(|(_, m)| m.clone())
            .unwrap();
        assert!(build_options(&matches).is_err());
    }
}
