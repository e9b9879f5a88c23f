//! screenrec - screen recording sessions and their post-processing pipeline.
//!
//! This is the main library crate. It provides the session controller, the
//! post-processing pipeline ledger and the external recording sentinel; the
//! actual capture work is delegated to a [`capture::CaptureSupervisor`].

pub mod capture;
pub mod config;
pub mod pipeline;
pub mod project;
pub mod recorder;
pub mod sentinel;
pub mod utils;

use anyhow::Context;
use capture::CaptureSupervisor;
use config::Config;
use project::JsonMetadataStore;
use recorder::{ControllerHandle, SessionController, TerminalBell};
use sentinel::{ExternalRecordingSentinel, ProcessTableLister};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenrec=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// A running controller and its background tasks
pub struct App {
    pub handle: ControllerHandle,
    pub controller: JoinHandle<()>,
    pub sentinel: JoinHandle<()>,
}

impl App {
    /// Wait for the controller to finish (after a quit)
    pub async fn join(self) -> anyhow::Result<()> {
        self.controller
            .await
            .context("Session controller task failed")?;
        self.sentinel.abort();
        Ok(())
    }
}

/// Start the session controller and the sentinel on the current runtime
pub fn launch(config: Config, supervisor: Arc<dyn CaptureSupervisor>) -> anyhow::Result<App> {
    tracing::info!("Starting screenrec v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.recordings_dir).with_context(|| {
        format!(
            "Failed to create recordings directory {:?}",
            config.recordings_dir
        )
    })?;

    let lister = ProcessTableLister::new(config.capture_process_names.clone());
    let interval = config.sentinel_interval();

    let (controller, handle) = SessionController::new(
        config,
        supervisor,
        Arc::new(JsonMetadataStore),
        Box::new(TerminalBell),
    );

    let sentinel = ExternalRecordingSentinel::new(lister).spawn(interval, handle.sender());
    let controller = tokio::spawn(controller.run());

    Ok(App {
        handle,
        controller,
        sentinel,
    })
}
