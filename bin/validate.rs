use clap::{Arg, ArgAction, Command};
use csv_upload::{parse_upload, SchemaFile, UploadFile};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logger(verbose: bool) {
    let default = if verbose {
        "csv_upload=debug,info"
    } else {
        "csv_upload=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("validate")
        .about("Run the upload pipeline on a CSV file and report the result")
        .arg(
            Arg::new("path")
                .long("path")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("schema")
                .long("schema")
                .required(true)
                .help("TOML column schema")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("max-rows")
                .long("max-rows")
                .help("Override max_rows from the schema")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("dedupe-on")
                .long("dedupe-on")
                .help("Override dedupe_on from the schema"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the full parse result as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_logger(matches.get_flag("verbose"));

    let path = matches.get_one::<PathBuf>("path").unwrap();
    let schema_path = matches.get_one::<PathBuf>("schema").unwrap();

    let mut schema = SchemaFile::from_file(schema_path)?;
    if let Some(max) = matches.get_one::<usize>("max-rows") {
        schema.max_rows = Some(*max);
    }
    if let Some(key) = matches.get_one::<String>("dedupe-on") {
        schema.dedupe_on = Some(key.clone());
    }
    let config = schema.into_config()?;

    let start = Instant::now();
    let file = UploadFile::from_path(path).await?;
    let result = parse_upload(&file, &config).await?;
    let elapsed = start.elapsed().as_secs_f64();

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let stats = result.validation_stats;
    println!(
        "source={} rows={} valid={} invalid={} duplicates={}",
        result.file_name,
        stats.total_rows,
        stats.valid_rows,
        stats.invalid_rows,
        stats.duplicate_rows,
    );
    println!(
        "can_upload={} crc=0x{:08x}\nelapsed={:.3}s",
        result.can_upload(),
        result.checksum(),
        elapsed
    );
    for presence in result.column_presence(&config.columns) {
        let mark = if presence.present { "x" } else { " " };
        let req = if presence.required { " (required)" } else { "" };
        println!("[{mark}] {}{req}", presence.input_name);
    }
    for note in &result.notes {
        println!("note: {note}");
    }
    let summary = result.error_summary();
    for error in &summary.shown {
        println!("error: {error}");
    }
    if let Some(more) = summary.overflow_message() {
        println!("{more}");
    }
    Ok(())
}
