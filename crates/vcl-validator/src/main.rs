use clap::Parser;
use std::process::ExitCode;
use tracing::Instrument;
use vcl_validator::{logging, Cli, SERVICE_NAME};

// Use mimalloc for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let config = cli.server_config();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "unable to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let root = tracing::info_span!("service", service = SERVICE_NAME);
    match runtime.block_on(vcl_validator::run(&cli, config).instrument(root)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}
