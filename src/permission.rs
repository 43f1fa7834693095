use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::HostTrait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    RecordAudio,
}

/// Static text shown when the platform asks the user for a grant
#[derive(Debug, Clone, Copy)]
pub struct PermissionPrompt {
    pub title: &'static str,
    pub message: &'static str,
    pub button_neutral: &'static str,
    pub button_negative: &'static str,
    pub button_positive: &'static str,
}

pub const RECORD_AUDIO_PROMPT: PermissionPrompt = PermissionPrompt {
    title: "Microphone Permission",
    message: "Voux needs access to your microphone to start recording",
    button_neutral: "Ask Me Later",
    button_negative: "Cancel",
    button_positive: "OK",
};

#[async_trait(?Send)]
pub trait PermissionService {
    /// Platforms that return `false` here are treated as pre-granted and never
    /// see a `request`.
    fn requires_explicit_grant(&self) -> bool;

    async fn request(&self, capability: Capability, prompt: &PermissionPrompt) -> Result<bool>;
}

/// Request the record capability, treating any failure as a denial.
pub async fn request_record_permission(service: &dyn PermissionService) -> bool {
    match service
        .request(Capability::RecordAudio, &RECORD_AUDIO_PROMPT)
        .await
    {
        Ok(granted) => granted,
        Err(e) => {
            tracing::error!("Record permission request failed: {:#}", e);
            false
        }
    }
}

/// Desktop hosts have no grant step.
pub struct PreGranted;

#[async_trait(?Send)]
impl PermissionService for PreGranted {
    fn requires_explicit_grant(&self) -> bool {
        false
    }

    async fn request(&self, _capability: Capability, _prompt: &PermissionPrompt) -> Result<bool> {
        Ok(true)
    }
}

/// Grants recording only when the host exposes a default input device.
pub struct InputDeviceGate;

#[async_trait(?Send)]
impl PermissionService for InputDeviceGate {
    fn requires_explicit_grant(&self) -> bool {
        true
    }

    async fn request(&self, capability: Capability, prompt: &PermissionPrompt) -> Result<bool> {
        tracing::info!(
            "{:?} requested. {}: {} [{} | {} | {}]",
            capability,
            prompt.title,
            prompt.message,
            prompt.button_neutral,
            prompt.button_negative,
            prompt.button_positive
        );

        let granted = tokio::task::spawn_blocking(|| cpal::default_host().default_input_device().is_some())
            .await
            .context("Input device check panicked")?;

        if !granted {
            tracing::warn!("No input device available, answering '{}'", prompt.button_negative);
        }
        Ok(granted)
    }
}
