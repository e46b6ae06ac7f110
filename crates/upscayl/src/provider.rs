//! Provider abstraction used by the task manager.
//!
//! [`UpscaleProvider`] is the seam between the correlation logic and the
//! concrete HTTP client, so the manager can be exercised against scripted
//! providers in tests.

use async_trait::async_trait;
use upscale_core::request::UpscaleRequest;
use upscale_core::task::ProviderObservation;

use crate::api::{ProviderError, StartedTask, UpscaylApi};

/// An external upscaling service that accepts work and reports progress.
#[async_trait]
pub trait UpscaleProvider: Send + Sync {
    /// Hand the request to the provider. Resolves on acceptance.
    async fn start_task(&self, request: &UpscaleRequest) -> Result<StartedTask, ProviderError>;

    /// Ask the provider for the current state of a previously started task.
    async fn task_status(&self, provider_task_id: &str)
        -> Result<ProviderObservation, ProviderError>;
}

#[async_trait]
impl UpscaleProvider for UpscaylApi {
    #[tracing::instrument(skip(self, request), fields(files = request.images.len(), urls = request.options.urls.len()))]
    async fn start_task(&self, request: &UpscaleRequest) -> Result<StartedTask, ProviderError> {
        UpscaylApi::start_task(self, request).await
    }

    #[tracing::instrument(skip(self))]
    async fn task_status(
        &self,
        provider_task_id: &str,
    ) -> Result<ProviderObservation, ProviderError> {
        self.get_task_status(provider_task_id).await
    }
}
