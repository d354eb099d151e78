use crate::config::Config;
use crate::errors::IntakeError;
use crate::service::{Intake, IntakeService};
use recordstore::RecordStore;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

pub mod body;
pub mod config;
pub mod cors;
pub mod errors;
pub mod metrics_defs;
pub mod pages;
pub mod routing;
pub mod service;
pub mod session;
pub mod submissions;

#[cfg(test)]
mod testutils;

/// Serves the site and the submission endpoints until a listener fails.
pub async fn run(config: Config, store: Arc<dyn RecordStore>) -> Result<(), IntakeError> {
    let intake = Intake::new(&config, store);
    let main_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        IntakeService::new(intake),
    );

    match &config.admin_listener {
        Some(admin) => {
            // The store is built before serving starts, so there is nothing to wait on
            let admin_service = AdminService::<_, IntakeError>::new(|| true);
            let admin_task = run_http_service(&admin.host, admin.port, admin_service);
            tokio::try_join!(main_task, admin_task)?;
        }
        None => main_task.await?,
    }

    Ok(())
}
