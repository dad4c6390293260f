use std::process::ExitCode;

use clap::Parser;
use log::error;
use stream_engine::{
    app,
    cli::Cli,
    config::StreamOptions,
    device::cpal_pcm::CpalEndpoint,
    error::{Result, StreamError},
};
use tracing_subscriber::EnvFilter;

fn init_logging(options: &StreamOptions) {
    let level = if options.quiet {
        "warn"
    } else if options.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(options: &StreamOptions) -> Result<()> {
    let endpoint = CpalEndpoint::open(&options.device, options.direction, options.nonblock)
        .map_err(|e| StreamError::device("audio open", e))?;
    app::run(endpoint, options)
}

fn main() -> ExitCode {
    let program = std::env::args().next().unwrap_or_else(|| "aplay".to_owned());
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let options = cli.into_options(&program);
    init_logging(&options);

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
