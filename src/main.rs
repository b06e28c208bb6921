use clap::{value_parser, Arg, ArgAction, Command};
use log::LevelFilter;
use quish_guard::{DetectorConfig, JsonLinesHistory, QuishingDetector, QuishingStats};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("quish-guard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Decode a QR code image, trace its redirects and rate the destination for quishing")
        .arg(
            Arg::new("image")
                .value_name("IMAGE")
                .help("Path to the image containing the QR code")
                .required_unless_present_any(["generate-config", "history-stats"]),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("YAML configuration file"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write the default configuration to FILE and exit")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("max-redirects")
                .long("max-redirects")
                .value_name("N")
                .help("Hard cap on followed redirects")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("follow-timeout")
                .long("follow-timeout")
                .value_name("SECS")
                .help("Timeout for the redirect-chain trace")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("probe-timeout")
                .long("probe-timeout")
                .value_name("SECS")
                .help("Timeout for the destination probe")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("no-probe")
                .long("no-probe")
                .help("Skip the destination probe and rate by redirect count only")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .value_name("FILE")
                .help("Append the verdict to a JSON-lines history file"),
        )
        .arg(
            Arg::new("history-stats")
                .long("history-stats")
                .value_name("FILE")
                .help("Print QR scan statistics from a history file and exit"),
        )
        .arg(
            Arg::new("compact")
                .long("compact")
                .help("Print the verdict on a single line")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging of decode attempts and redirect hops")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    if let Some(history_path) = matches.get_one::<String>("history-stats") {
        print_history_stats(history_path);
        return;
    }

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {e:#}");
                process::exit(1);
            }
        },
        None => DetectorConfig::default(),
    };

    if let Some(&max_redirects) = matches.get_one::<usize>("max-redirects") {
        config.resolver.max_redirects = max_redirects;
    }
    if let Some(&secs) = matches.get_one::<u64>("follow-timeout") {
        config.resolver.follow_timeout_secs = secs;
    }
    if let Some(&secs) = matches.get_one::<u64>("probe-timeout") {
        config.resolver.probe_timeout_secs = secs;
    }
    if matches.get_flag("no-probe") {
        config.resolver.probe_destination = false;
    }

    let mut detector = match QuishingDetector::new(config) {
        Ok(detector) => detector,
        Err(e) => {
            eprintln!("Error creating HTTP client: {e:#}");
            process::exit(1);
        }
    };
    if let Some(history_path) = matches.get_one::<String>("history") {
        let history = JsonLinesHistory::new(history_path);
        log::debug!("Recording verdicts to {}", history.path().display());
        detector = detector.with_history(Arc::new(history));
    }

    // required_unless_present_any guarantees the image in this branch
    let Some(image) = matches.get_one::<String>("image") else {
        eprintln!("Usage: quish-guard <IMAGE>");
        process::exit(2);
    };

    let verdict = detector.analyze(image).await;
    if !verdict.is_decoded() {
        log::warn!("No QR code could be decoded from {image}");
    }
    let output = if matches.get_flag("compact") {
        serde_json::to_string(&verdict)
    } else {
        serde_json::to_string_pretty(&verdict)
    };

    match output {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing verdict: {e}");
            process::exit(1);
        }
    }
}

fn load_config(path: &str) -> anyhow::Result<DetectorConfig> {
    if std::path::Path::new(path).exists() {
        DetectorConfig::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(DetectorConfig::default())
    }
}

fn generate_default_config(path: &str) {
    let config = DetectorConfig::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Edit safe_domains and suspicious_keywords to suit your deployment.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

fn print_history_stats(path: &str) {
    let records = match JsonLinesHistory::new(path).read_all() {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error reading history: {e:#}");
            process::exit(1);
        }
    };

    let stats = QuishingStats::from_records(&records);
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing statistics: {e}");
            process::exit(1);
        }
    }
}
