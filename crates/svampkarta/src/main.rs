// The binary uses the library, not duplicate modules
use std::process::ExitCode;
use svampkarta::{Settings, run, setup_logging};

fn main() -> ExitCode {
    setup_logging();
    let settings = Settings::from_cli();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start the async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
