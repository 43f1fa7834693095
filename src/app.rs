use crate::audio::{CpalRecorderFactory, RodioPlayerFactory};
use crate::config::Config;
use crate::controller::{Controller, ControllerParts};
use crate::input;
use crate::messages::Intent;
use crate::permission::{InputDeviceGate, PermissionService, PreGranted};
use crate::reconcile::ViewModel;

use anyhow::{Context, Result};
use std::rc::Rc;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusFormat {
    Text,
    Json,
}

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        if let Some(parent) = config.resource.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create resource directory: {:?}", parent))?;
        }

        tracing::info!("Using resource {}", config.resource.display());
        Ok(Self { config })
    }

    /// Run until `quit`, end of input or Ctrl+C. Must run inside a `LocalSet`.
    pub async fn run(self) -> Result<()> {
        let (view_tx, view_rx) = watch::channel(ViewModel::default());
        let controller = Controller::new(self.controller_parts(), view_tx);

        let (intent_tx, intent_rx) = mpsc::channel(16);
        let mut controller_task = tokio::task::spawn_local(controller.run(intent_rx));

        input::spawn_stdin_reader(intent_tx.clone());
        let status_task = tokio::task::spawn_local(print_status(view_rx, self.status_format()));

        tokio::select! {
            result = &mut controller_task => {
                result.context("Controller task failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                let _ = intent_tx.send(Intent::Shutdown).await;
                controller_task.await.context("Controller task failed")?;
            }
        }

        status_task.abort();
        tracing::info!("Voux shutdown complete");
        Ok(())
    }

    fn controller_parts(&self) -> ControllerParts {
        let permissions: Rc<dyn PermissionService> = if self.config.require_record_permission {
            Rc::new(InputDeviceGate)
        } else {
            Rc::new(PreGranted)
        };

        ControllerParts {
            resource: self.config.resource.clone(),
            players: Rc::new(RodioPlayerFactory),
            recorders: Rc::new(CpalRecorderFactory),
            permissions,
            progress_interval: self.config.progress_interval(),
            seek_debounce: self.config.seek_debounce(),
            looping: self.config.looping,
        }
    }

    fn status_format(&self) -> StatusFormat {
        match self.config.status_format.as_str() {
            "json" => StatusFormat::Json,
            _ => StatusFormat::Text,
        }
    }
}

fn render(view: &ViewModel, format: StatusFormat) -> Result<String> {
    match format {
        StatusFormat::Text => Ok(view.to_string()),
        StatusFormat::Json => serde_json::to_string(view).context("Failed to serialize status"),
    }
}

/// Print the view model whenever its rendering changes.
async fn print_status(mut view: watch::Receiver<ViewModel>, format: StatusFormat) {
    let mut last = String::new();
    while view.changed().await.is_ok() {
        let snapshot = view.borrow_and_update().clone();
        match render(&snapshot, format) {
            Ok(line) if line != last => {
                println!("{line}");
                last = line;
            }
            Ok(_) => {}
            Err(e) => tracing::error!("{:#}", e),
        }
    }
}
