use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use parcelcam::recorder::overlay::format_elapsed;
use parcelcam::recorder::{DeviceKind, RecorderError};
use parcelcam::storage::naming::DISPLAY_TIMESTAMP_FORMAT;
use parcelcam::{
    ArtifactKey, Catalog, CatalogQuery, MetadataStore, Recorder, RecorderConfig, RecorderEvent,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parcelcam=info".parse()?),
        )
        .init();

    let matches = build_cli().get_matches();
    let config = load_config(&matches);

    match matches.subcommand() {
        Some(("record", sub_m)) => run_record(config, sub_m).await,
        Some(("annotate", sub_m)) => run_annotate(&config, sub_m),
        Some(("show", sub_m)) => run_show(&config, sub_m),
        Some(("list", sub_m)) => run_list(&config, sub_m),
        Some(("summary", _)) => run_summary(&config),
        _ => Ok(()),
    }
}

fn build_cli() -> Command {
    Command::new("parcelcam")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Record parcel packing videos tagged by tracking number")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .env("PARCELCAM_CONFIG")
                .default_value("config.json")
                .global(true)
                .help("Configuration file (JSON, or TOML with a .toml extension)"),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .global(true)
                .help("Directory holding recordings (overrides the config file)"),
        )
        .subcommand(
            Command::new("record")
                .about("Capture from the camera and record scanned tracking numbers")
                .long_about(
                    "Reads commands from standard input, one per line. Any other line is \
                     taken as a tracking number and starts a recording. \
                     Commands: stop (or an empty line), reset, status, quit.",
                )
                .arg(
                    Arg::new("synthetic")
                        .long("synthetic")
                        .action(ArgAction::SetTrue)
                        .help("Use the built-in test pattern instead of a camera"),
                ),
        )
        .subcommand(
            Command::new("annotate")
                .about("Replace the problem tags and notes of a recording")
                .arg(file_arg())
                .arg(
                    Arg::new("problem")
                        .short('p')
                        .long("problem")
                        .value_name("TAG")
                        .action(ArgAction::Append)
                        .help("Problem tag (repeatable)"),
                )
                .arg(
                    Arg::new("notes")
                        .short('n')
                        .long("notes")
                        .value_name("TEXT")
                        .default_value("")
                        .help("Free-text notes"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Print the annotations of a recording")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List recordings, newest first")
                .arg(
                    Arg::new("search")
                        .short('s')
                        .long("search")
                        .value_name("TEXT")
                        .help("Tracking number contains TEXT (case-insensitive)"),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("YYYY-MM-DD")
                        .help("First day to include"),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_name("YYYY-MM-DD")
                        .help("Last day to include"),
                )
                .arg(
                    Arg::new("with-problems")
                        .long("with-problems")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("without-problems")
                        .help("Only recordings with problem tags"),
                )
                .arg(
                    Arg::new("without-problems")
                        .long("without-problems")
                        .action(ArgAction::SetTrue)
                        .help("Only recordings without problem tags"),
                ),
        )
        .subcommand(Command::new("summary").about("Show recording statistics"))
}

fn file_arg() -> Arg {
    Arg::new("file")
        .value_name("FILE")
        .required(true)
        .help("Video file, as a path or a file name in the output directory")
}

/// Value of a global option, wherever on the command line it was given
fn global_value<'a>(matches: &'a ArgMatches, name: &str) -> Option<&'a String> {
    matches
        .subcommand()
        .and_then(|(_, sub_m)| sub_m.get_one::<String>(name))
        .or_else(|| matches.get_one::<String>(name))
}

fn load_config(matches: &ArgMatches) -> RecorderConfig {
    let path = global_value(matches, "config")
        .map(String::as_str)
        .unwrap_or("config.json");
    let mut config = RecorderConfig::load_or_default(path);

    if let Some(dir) = global_value(matches, "output-dir") {
        config.output_dir = PathBuf::from(dir);
    }
    config
}

async fn run_record(mut config: RecorderConfig, matches: &ArgMatches) -> Result<()> {
    if matches.get_flag("synthetic") {
        config.device = DeviceKind::Synthetic;
    }

    let (recorder, mut events) = Recorder::spawn(config).context("Failed to start recorder")?;
    println!(
        "Ready. Scan a tracking number to start recording; \
         'stop', 'status', 'reset' or 'quit'."
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read standard input")? else {
                    break;
                };
                if !handle_line(&recorder, line.trim()).await? {
                    break;
                }
            }
            event = events.recv_control() => match event {
                Some(event) => print_event(&event),
                None => {
                    eprintln!("Recorder stopped unexpectedly");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    recorder.shutdown().await.context("Failed to shut down recorder")?;
    while let Some(event) = events.try_recv_control() {
        print_event(&event);
    }
    Ok(())
}

/// Run one operator command; `false` ends the session loop
async fn handle_line(recorder: &Recorder, line: &str) -> Result<bool> {
    let outcome = match line {
        "quit" | "exit" => return Ok(false),
        "" | "stop" => recorder.stop().await.map(|summary| {
            if summary.is_none() {
                println!("Not recording");
            }
        }),
        "reset" => recorder.reset().await.map(|_| println!("Ready")),
        "status" => recorder.status().await.map(|status| {
            println!(
                "{} {} frames={} elapsed={}",
                status.state,
                status.tracking_number.as_deref().unwrap_or("-"),
                status.frame_count,
                format_elapsed(status.elapsed)
            );
        }),
        tracking_number => recorder.start(tracking_number).await.map(|info| {
            println!("Recording {} (codec {})", info.path.display(), info.codec);
        }),
    };

    match outcome {
        Ok(()) => Ok(true),
        Err(RecorderError::EngineStopped) => bail!("Recorder engine stopped"),
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(true)
        }
    }
}

fn print_event(event: &RecorderEvent) {
    match event {
        RecorderEvent::FrameReady(_) => {}
        RecorderEvent::SessionStarted { .. } => {}
        RecorderEvent::Warning { remaining_secs } => {
            println!("Warning: recording stops in {}s", remaining_secs);
        }
        RecorderEvent::TimedOut { summary } => {
            println!(
                "Time limit reached: saved {} ({} frames)",
                summary.path.display(),
                summary.frame_count
            );
        }
        RecorderEvent::SessionStopped { summary, reason } => {
            println!(
                "Stopped ({:?}): saved {} ({} frames, {})",
                reason,
                summary.path.display(),
                summary.frame_count,
                format_elapsed(summary.duration)
            );
        }
        RecorderEvent::Error { kind, message } => {
            eprintln!("Recording error ({}): {}", kind, message);
        }
    }
}

/// Resolve a FILE argument to its recording key and sidecar directory
fn resolve_recording(config: &RecorderConfig, file: &str) -> Result<(ArtifactKey, PathBuf)> {
    let path = Path::new(file);
    let Some(key) = ArtifactKey::parse_path(path) else {
        bail!("'{}' is not named like a recording (<tracking>_<YYYYMMDD>_<HHMMSS>.<ext>)", file);
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => config.output_dir.clone(),
    };
    Ok((key, dir))
}

fn run_annotate(config: &RecorderConfig, matches: &ArgMatches) -> Result<()> {
    let file = matches
        .get_one::<String>("file")
        .context("FILE is required")?;
    let (key, dir) = resolve_recording(config, file)?;
    let problems = clean_problems(matches.get_many::<String>("problem").into_iter().flatten());
    let notes = matches
        .get_one::<String>("notes")
        .map(|notes| notes.trim())
        .unwrap_or("");

    let record = MetadataStore::new(dir)
        .save(&key, problems, notes)
        .with_context(|| format!("Failed to annotate {}", key))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Trim operator-typed tags and drop the blank ones
fn clean_problems<'a>(raw: impl IntoIterator<Item = &'a String>) -> Vec<&'a str> {
    raw.into_iter()
        .map(|problem| problem.trim())
        .filter(|problem| !problem.is_empty())
        .collect()
}

fn run_show(config: &RecorderConfig, matches: &ArgMatches) -> Result<()> {
    let file = matches
        .get_one::<String>("file")
        .context("FILE is required")?;
    let (key, dir) = resolve_recording(config, file)?;
    let record = MetadataStore::new(dir).load(&key);

    println!("Tracking number: {}", key.tracking_number);
    println!("Recorded at:     {}", key.timestamp_display());
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn parse_day(matches: &ArgMatches, name: &str) -> Result<Option<NaiveDate>> {
    matches
        .get_one::<String>(name)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("--{} expects YYYY-MM-DD, got '{}'", name, raw))
        })
        .transpose()
}

fn run_list(config: &RecorderConfig, matches: &ArgMatches) -> Result<()> {
    let has_problems = if matches.get_flag("with-problems") {
        Some(true)
    } else if matches.get_flag("without-problems") {
        Some(false)
    } else {
        None
    };
    let query = CatalogQuery {
        search: matches.get_one::<String>("search").cloned(),
        from: parse_day(matches, "from")?,
        to: parse_day(matches, "to")?,
        has_problems,
    };

    let catalog = Catalog::new(config.output_dir.clone());
    let entries = catalog
        .query(&query)
        .with_context(|| format!("Failed to scan {}", catalog.dir().display()))?;

    for entry in &entries {
        let problems: Vec<&str> = entry.metadata.problems.iter().map(String::as_str).collect();
        println!(
            "{}  {:<24} {:>10}  {}",
            entry.key.started_at.format(DISPLAY_TIMESTAMP_FORMAT),
            entry.key.tracking_number,
            format_size(entry.size),
            problems.join(", ")
        );
    }
    println!("{} recording(s)", entries.len());
    Ok(())
}

fn run_summary(config: &RecorderConfig) -> Result<()> {
    let catalog = Catalog::new(config.output_dir.clone());
    let summary = catalog
        .summary()
        .with_context(|| format!("Failed to scan {}", catalog.dir().display()))?;

    println!("Recordings:    {}", summary.total);
    println!("Today:         {}", summary.today);
    println!("With problems: {}", summary.with_problems);
    println!("Total size:    {}", format_size(summary.total_bytes));
    for (problem, count) in &summary.problem_distribution {
        println!("  {:<20} {}", problem, count);
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
