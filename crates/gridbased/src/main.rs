use std::error::Error;
use std::process::ExitCode;

use gridbase_config::{Config, ConfigError};

fn main() -> ExitCode {
    let config = match Config::resolve() {
        Ok(config) => config,
        Err(error) => return report_config_error(&error),
    };
    match gridbased::run_service(&config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("gridbased: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Hands flag errors, `--help` and `--version` back to clap so they print and
/// exit the usual way; other configuration errors exit with status 2.
fn report_config_error(error: &ConfigError) -> ExitCode {
    let mut cause: Option<&(dyn Error + 'static)> = Some(error);
    while let Some(current) = cause {
        if let Some(usage) = current.downcast_ref::<clap::Error>() {
            usage.exit();
        }
        cause = current.source();
    }
    eprintln!("gridbased: {error}");
    match error {
        ConfigError::Load { .. } => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
