mod report;
mod text;


use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use peimage::Image;
use peimage::resource::DEFAULT_MAX_DEPTH;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::report::Report;


/// Prints the headers, sections, resources and version information of a PE image.
#[derive(Parser)]
struct Args {
    /// Output the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// How many levels of resource tables and version nodes to descend into.
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    pub input_file: PathBuf,
}


fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let started = Instant::now();

    let file = match File::open(&args.input_file) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open {}: {}", args.input_file.display(), e);
            return ExitCode::FAILURE;
        },
    };
    let image = match Image::open(file) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("failed to read {}: {}", args.input_file.display(), e);
            return ExitCode::FAILURE;
        },
    };

    let report = Report::collect(&args.input_file, &image, args.max_depth);
    let elapsed = started.elapsed();
    debug!("collected report in {:?}", elapsed);

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            },
        }
    } else {
        print!("{}", text::render(&report));
        println!();
        println!("Elapsed: {:?}", elapsed);
    }
    ExitCode::SUCCESS
}
