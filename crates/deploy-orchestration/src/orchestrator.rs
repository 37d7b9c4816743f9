//! Post-deployment sequencing over scripts, trigger sync, and auto-swap

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};

use control_plane::{ClientConfig, ControlPlaneClient, TokenSigner, attempt};
use script_runner::ScriptRunner;

use crate::config::DeploymentConfig;
use crate::markers::{PendingOperationTracker, SwapLock};
use crate::triggers::list_triggers;
use crate::{Error, Result};

/// Restart requests retry on a fixed interval; everything else fails fast.
const RESTART_ATTEMPTS: u32 = 5;
const RESTART_INTERVAL: Duration = Duration::from_millis(5000);

const SYNC_TRIGGERS_PATH: &str = "/operations/settriggers";
const AUTO_SWAP_PATH: &str = "/operations/autoswap";
const RESTART_PATH: &str = "/operations/restart";
const REMOVE_WORKERS_PATH: &str = "/operations/removeworker";
const PACKAGE_POINTER_PATH: &str = "/operations/updatepackagename";

/// Entry points invoked by the hosting process after content deployment.
///
/// This is a stable exported contract: the surrounding host integration
/// calls these operations by name with a caller-supplied request id.
pub struct PostDeploymentRunner {
    config: DeploymentConfig,
    client: ControlPlaneClient,
}

impl PostDeploymentRunner {
    /// Build a runner from explicit configuration.
    ///
    /// Fails with [`Error::PreconditionMissing`] when no host identity is
    /// known, before any side effect is attempted.
    pub fn new(config: DeploymentConfig, signer: Arc<dyn TokenSigner>) -> Result<Self> {
        if config.host_name.is_none() && config.local_authority.is_none() {
            return Err(Error::PreconditionMissing("host name"));
        }
        let client_config = ClientConfig {
            host_name: config.host_name.clone().unwrap_or_default(),
            local_authority: config.local_authority.clone(),
            home_stamp: config.home_stamp.clone(),
            validate_ssl: config.validate_ssl,
        };
        let client = ControlPlaneClient::new(client_config, signer);
        Ok(Self { config, client })
    }

    /// Run the full post-deployment sequence: scripts, then trigger sync,
    /// then auto-swap when a swap slot is configured.
    pub async fn run(&self, request_id: &str) -> Result<()> {
        self.run_post_deployment_scripts().await?;
        self.sync_triggers(request_id).await?;
        if self.config.swap_slot_name.is_some() {
            self.perform_auto_swap(request_id).await?;
        }
        Ok(())
    }

    /// Execute every discovered script in lexicographic order; the first
    /// failure aborts the batch and propagates unchanged.
    pub async fn run_post_deployment_scripts(&self) -> Result<()> {
        let dir = self.config.post_deployment_scripts_dir();
        let runner = ScriptRunner::new(self.config.script_timeout());
        runner.run_all(&dir).await?;
        Ok(())
    }

    /// Build the enriched trigger payload and send it to the control plane,
    /// then mirror it to the external artifact URL when one is configured.
    /// The mirror PUT always happens after the trigger sync.
    pub async fn sync_triggers(&self, request_id: &str) -> Result<()> {
        let triggers = list_triggers(&self.config.site_root)?;
        info!(count = triggers.len(), "syncing function triggers");
        let payload = Value::Array(triggers);
        self.client
            .post(SYNC_TRIGGERS_PATH, request_id, Some(payload.clone()))
            .await?;
        if let Some(url) = &self.config.trigger_artifact_url {
            self.client.put(url, request_id, payload).await?;
        }
        Ok(())
    }

    /// Request slot auto-swap and mark it ongoing with the swap lock.
    ///
    /// The lock has no explicit clear; it deactivates by staleness.
    pub async fn perform_auto_swap(&self, request_id: &str) -> Result<()> {
        let Some(slot) = &self.config.swap_slot_name else {
            return Ok(());
        };
        self.client
            .post(&format!("{AUTO_SWAP_PATH}?slot={slot}"), request_id, None)
            .await?;
        SwapLock::new(self.config.swap_lock_path()).write();
        info!(%slot, "auto-swap requested");
        Ok(())
    }

    /// Restart the main site, retrying transient failures on a fixed
    /// interval before propagating the last error.
    pub async fn restart_main_site(&self, request_id: &str) -> Result<()> {
        attempt(
            || async { self.client.post(RESTART_PATH, request_id, None).await },
            RESTART_ATTEMPTS,
            RESTART_INTERVAL,
        )
        .await?;
        Ok(())
    }

    /// Remove all idle workers. Only meaningful on the dynamic SKU; logged
    /// and skipped elsewhere.
    pub async fn remove_all_workers(&self, request_id: &str) -> Result<()> {
        if !self.config.is_dynamic_sku() {
            warn!("remove-workers requested outside the dynamic SKU, skipping");
            return Ok(());
        }
        self.client.post(REMOVE_WORKERS_PATH, request_id, None).await?;
        Ok(())
    }

    /// Notify the control plane of a run-from-package pointer change.
    pub async fn update_package_pointer(
        &self,
        request_id: &str,
        package_name: &str,
    ) -> Result<()> {
        self.client
            .post(
                PACKAGE_POINTER_PATH,
                request_id,
                Some(json!({ "packageName": package_name })),
            )
            .await?;
        Ok(())
    }

    /// Track an arbitrary long-running task with the pending-operation
    /// heartbeat. No-op passthrough outside the managed environment.
    /// Returns `None` when the timeout elapsed before the task completed.
    pub async fn track_pending_operation<F, T>(&self, task: F, timeout: Option<Duration>) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let tracker = PendingOperationTracker::new(
            self.config.pending_marker_path(),
            self.config.is_managed_environment(),
        );
        tracker.track(task, timeout).await
    }

    /// Generate a correlation id for callers that do not supply one
    pub fn new_request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
