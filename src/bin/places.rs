//! places CLI - Command-line interface for placesense
//!
//! Commands:
//! - cluster: Recognize significant places in a location trace
//! - annotate: Tag trace points with nearby recognized places
//! - config: Print the effective configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use placesense::annotator::ProximityAnnotator;
use placesense::config::RecognitionConfig;
use placesense::observer::LogObserver;
use placesense::pipeline::cluster_places;
use placesense::significance::SignificanceFilter;
use placesense::types::{LocationSample, PlaceTagRecord, TracePoint};
use placesense::{PlaceError, PLACESENSE_VERSION, PRODUCER_NAME};

/// places - Recognize home, office and other significant places from GPS traces
#[derive(Parser)]
#[command(name = "places")]
#[command(version = PLACESENSE_VERSION)]
#[command(about = "Recognize significant places from location traces", long_about = None)]
struct Cli {
    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize places in a trace
    Cluster {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// User the records are attributed to
        #[arg(long, default_value = "")]
        user_id: String,
    },

    /// Overwrite the near-tags of trace points from place records
    Annotate {
        /// Trace points file (use - for stdin)
        #[arg(short, long)]
        points: PathBuf,

        /// Place tag records file, as produced by `places cluster`
        #[arg(long)]
        places: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Proximity threshold in meters (overrides the configuration)
        #[arg(long)]
        near_distance: Option<f64>,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// JSON array of samples
    Json,
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// JSON array
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), PlacesCliError> {
    match command {
        Commands::Cluster {
            input,
            output,
            input_format,
            output_format,
            config,
            user_id,
        } => cmd_cluster(
            &input,
            &output,
            input_format,
            &output_format,
            config.as_deref(),
            &user_id,
        ),

        Commands::Annotate {
            points,
            places,
            output,
            output_format,
            config,
            near_distance,
        } => cmd_annotate(
            &points,
            &places,
            &output,
            &output_format,
            config.as_deref(),
            near_distance,
        ),

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", config.to_json()?);
            Ok(())
        }

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_cluster(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: &OutputFormat,
    config_path: Option<&Path>,
    user_id: &str,
) -> Result<(), PlacesCliError> {
    let config = load_config(config_path)?;
    let input_data = read_input(input)?;

    let samples: Vec<LocationSample> = match input_format {
        InputFormat::Json => serde_json::from_str(&input_data)?,
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
    };
    if samples.is_empty() {
        return Err(PlacesCliError::NoSamples);
    }

    let places = cluster_places(user_id, &samples, &config, &LogObserver)?;
    let records: Vec<PlaceTagRecord> = places.iter().flat_map(|p| p.to_tag_records()).collect();

    write_output(output, &format_output(&records, output_format)?)
}

fn cmd_annotate(
    points_path: &Path,
    places_path: &Path,
    output: &Path,
    output_format: &OutputFormat,
    config_path: Option<&Path>,
    near_distance: Option<f64>,
) -> Result<(), PlacesCliError> {
    let config = load_config(config_path)?;
    let near_distance = near_distance.unwrap_or(config.near_distance);
    if !near_distance.is_finite() || near_distance < 0.0 {
        return Err(PlacesCliError::Place(PlaceError::InvalidConfig(format!(
            "near distance must be a non-negative number, got {}",
            near_distance
        ))));
    }

    let mut points: Vec<TracePoint> = serde_json::from_str(&read_input(points_path)?)?;
    let places: Vec<PlaceTagRecord> = serde_json::from_str(&fs::read_to_string(places_path)?)?;

    let tagged = ProximityAnnotator::annotate(&mut points, &places, near_distance);
    log::info!("{} of {} trace points near a recognized place", tagged, points.len());

    write_output(output, &format_output(&points, output_format)?)
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), PlacesCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    let config = match config_path {
        Some(path) if path.exists() => match fs::read_to_string(path) {
            Ok(content) => match RecognitionConfig::from_json(&content) {
                Ok(config) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Valid configuration with {} time window(s)",
                            config.time_windows.len()
                        ),
                    });
                    Some(config)
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    });
                    None
                }
            },
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read configuration file: {}", e),
                });
                None
            }
        },
        Some(_) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Configuration file does not exist".to_string(),
            });
            None
        }
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "Using built-in defaults".to_string(),
            });
            Some(RecognitionConfig::default())
        }
    };

    if let Some(config) = config {
        checks.extend(config_checks(&config));
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PLACESENSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("places Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PlacesCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

/// Checks on a parsed configuration: derived significance size and window coverage
fn config_checks(config: &RecognitionConfig) -> Vec<DoctorCheck> {
    let min_size =
        SignificanceFilter::min_size(config.effective_time_threshold(), config.sampling_interval);
    let significance = if min_size < 2 {
        DoctorCheck {
            name: "significance".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "timeThreshold admits clusters of {} sample(s); every stop becomes a place",
                min_size
            ),
        }
    } else {
        DoctorCheck {
            name: "significance".to_string(),
            status: CheckStatus::Ok,
            message: format!("Clusters need at least {} samples", min_size),
        }
    };

    let uncovered = (0..24u32)
        .filter(|h| !config.time_windows.iter().any(|w| w.contains_hour(*h)))
        .count();
    let time_windows = DoctorCheck {
        name: "time_windows".to_string(),
        status: if config.time_windows.is_empty() {
            CheckStatus::Error
        } else {
            CheckStatus::Ok
        },
        message: format!(
            "{} window(s), {} hour(s) of the day not covered",
            config.time_windows.len(),
            uncovered
        ),
    };

    vec![significance, time_windows]
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<RecognitionConfig, PlacesCliError> {
    match path {
        Some(path) => Ok(RecognitionConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(RecognitionConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, PlacesCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(PlacesCliError::NoInput);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), PlacesCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", data)?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn parse_ndjson(data: &str) -> Result<Vec<LocationSample>, PlacesCliError> {
    data.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line.trim())
                .map_err(|e| PlacesCliError::ParseError(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

fn format_output<T: serde::Serialize>(
    records: &[T],
    format: &OutputFormat,
) -> Result<String, PlacesCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for record in records {
                out.push_str(&serde_json::to_string(record)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum PlacesCliError {
    Io(io::Error),
    Place(PlaceError),
    Json(serde_json::Error),
    NoSamples,
    NoInput,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for PlacesCliError {
    fn from(e: io::Error) -> Self {
        PlacesCliError::Io(e)
    }
}

impl From<PlaceError> for PlacesCliError {
    fn from(e: PlaceError) -> Self {
        PlacesCliError::Place(e)
    }
}

impl From<serde_json::Error> for PlacesCliError {
    fn from(e: serde_json::Error) -> Self {
        PlacesCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PlacesCliError> for CliError {
    fn from(e: PlacesCliError) -> Self {
        match e {
            PlacesCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PlacesCliError::Place(e) => {
                let (code, hint) = match &e {
                    PlaceError::InsufficientData { .. } => (
                        "INSUFFICIENT_DATA",
                        "Provide a trace spanning at least two sampling intervals",
                    ),
                    PlaceError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Run 'places doctor --config FILE' for details")
                    }
                    PlaceError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
                    _ => ("PLACE_ERROR", "Check input data"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PlacesCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PlacesCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No location samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PlacesCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a terminal, expected a piped trace".to_string(),
                hint: Some("Pipe a trace into 'places cluster --input -' or pass a file".to_string()),
            },
            PlacesCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            PlacesCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Expect one {timestamp, latitude, longitude} object per line".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_checks() {
        let checks = config_checks(&RecognitionConfig::default());

        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].name, "significance");
        assert!(matches!(checks[0].status, CheckStatus::Ok));
        assert_eq!(checks[0].message, "Clusters need at least 3 samples");
        assert_eq!(checks[1].name, "time_windows");
        assert!(matches!(checks[1].status, CheckStatus::Ok));
        assert_eq!(checks[1].message, "2 window(s), 9 hour(s) of the day not covered");
    }

    #[test]
    fn test_short_threshold_warns() {
        let config = RecognitionConfig {
            sampling_interval: 600,
            time_threshold: Some(900),
            ..RecognitionConfig::default()
        };

        let checks = config_checks(&config);
        assert!(matches!(checks[0].status, CheckStatus::Warning));
        assert!(checks[0].message.contains("clusters of 1 sample(s)"));
    }

    #[test]
    fn test_no_windows_is_an_error() {
        let config = RecognitionConfig {
            time_windows: Vec::new(),
            ..RecognitionConfig::default()
        };

        let checks = config_checks(&config);
        assert!(matches!(checks[1].status, CheckStatus::Error));
        assert_eq!(checks[1].message, "0 window(s), 24 hour(s) of the day not covered");
    }
}
