use clap::Parser;
use config::Config;
use contact_form::{ContactController, NoticeClass};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod config;
mod telemetry;

#[derive(Parser)]
#[command(name = "formdesk", version, about = "Static site and form submission server")]
enum CliCommand {
    /// Serve the site and the submission endpoints
    Serve {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Submit the contact form once and print the resulting notice
    Contact {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value = contact_form::DEFAULT_ENDPOINT)]
        endpoint: String,
    },
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Serve { config } => serve(config.as_deref()),
        CliCommand::Contact {
            name,
            email,
            query,
            endpoint,
        } => contact(name, email, query, endpoint),
    }
}

fn serve(path: Option<&Path>) -> ExitCode {
    let config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("formdesk: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = telemetry::init_logging(config.common.logging.as_ref());
    if let Some(metrics) = &config.common.metrics
        && let Err(e) = telemetry::init_metrics(metrics)
    {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let store = match recordstore::get_store(&config.record_store) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(error = %e, "Failed to set up record store");
                return ExitCode::FAILURE;
            }
        };

        match intake::run(config.intake, store).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "Server stopped");
                ExitCode::FAILURE
            }
        }
    })
}

fn contact(name: String, email: String, query: String, endpoint: String) -> ExitCode {
    let _sentry = telemetry::init_logging(None);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let mut controller = ContactController::new(endpoint);
    *controller.form_mut() = contact_form::FormData { name, email, query };

    let notice = runtime.block_on(controller.submit_form());
    println!("{}", notice.text);

    match notice.class {
        NoticeClass::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}
