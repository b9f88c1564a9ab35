use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use protoschema::schema::{build_with, BuildOptions, FsLoader};

#[derive(Parser)]
#[command(name = "protoschema-check")]
#[command(about = "Parse .proto files with their imports and report diagnostics")]
struct Args {
    /// Directory to search for imports; may be repeated. Defaults to `.`
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Report import cycles as diagnostics
    #[arg(long)]
    report_cycles: bool,

    /// Maximum number of files read at once
    #[arg(long, default_value_t = 16)]
    max_concurrent_loads: usize,

    /// Entry files, relative to the include directories
    #[arg(required = true)]
    files: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let roots = if args.include.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.include
    };
    let loader = FsLoader::new(roots);
    let options = BuildOptions {
        max_concurrent_loads: args.max_concurrent_loads,
        report_import_cycles: args.report_cycles,
        ..BuildOptions::default()
    };

    let schema = build_with(&loader, &args.files, &options).await;
    for diagnostic in &schema.diagnostics {
        print!("{}", schema.render_diagnostic(diagnostic));
    }

    if schema.diagnostics.is_empty() {
        ExitCode::SUCCESS
    } else {
        eprintln!(
            "{} diagnostic(s) in {} file(s)",
            schema.diagnostics.len(),
            schema.files.len()
        );
        ExitCode::FAILURE
    }
}
