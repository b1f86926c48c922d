// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Posture Analyzer CLI.

use std::process;

use clap::Parser;
use posture_analyzer::cli::analyze::run_analysis;
use posture_analyzer::cli::args::{Cli, Commands, ServeArgs};
use posture_analyzer::cli::logging::init_tracing;
use posture_analyzer::server::{ServerConfig, serve};
use posture_analyzer::{InferenceConfig, error};

fn main() {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Analyze(args) => {
            init_tracing("warn");
            run_analysis(&args).map(|_| ())
        }
        Commands::Serve(args) => {
            init_tracing("info");
            run_server(args)
        }
    };

    if let Err(e) = outcome {
        error!("{e}");
        process::exit(1);
    }
}

fn run_server(args: ServeArgs) -> posture_analyzer::Result<()> {
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        model_path: args.model,
        inference: InferenceConfig::new().with_confidence(args.conf),
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
        upload_dir: args.upload_dir,
    };
    config.inference.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(serve(config))
}
