//! Environment-derived deployment configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use script_runner::DEFAULT_SCRIPT_TIMEOUT;

/// SKU name of the consumption (dynamic) plan.
const DYNAMIC_SKU: &str = "Dynamic";
/// Convention-based scripts directory under the deployment tools root.
const DEFAULT_SCRIPTS_SUBDIR: &str = "site/deployments/tools/PostDeploymentActions";
/// Fixed relative path of the auto-swap lock under the home directory.
const SWAP_LOCK_SUBPATH: &str = "locks/autoswap.lock";
/// Heartbeat marker file name under the system temp directory.
const PENDING_MARKER_FILE: &str = "deploy-pending-operation.marker";

/// Explicit configuration struct, populated once at process start and passed
/// down. Every recognized environment value is enumerated here; nothing else
/// reads the environment at call time.
#[derive(Debug, Clone, Default)]
pub struct DeploymentConfig {
    /// Public host name of the site's management endpoint
    pub host_name: Option<String>,
    /// Explicit authority for a local development endpoint (plain HTTP)
    pub local_authority: Option<String>,
    /// Staging slot configured for auto-swap, when any
    pub swap_slot_name: Option<String>,
    /// Home stamp identity for fallback address derivation
    pub home_stamp: Option<String>,
    /// Instance identity; present only inside the managed hosting environment
    pub instance_id: Option<String>,
    /// Plan SKU of the site (worker removal only applies to the dynamic SKU)
    pub sku: Option<String>,
    /// Per-script wall-clock budget override
    pub command_timeout: Option<Duration>,
    /// Override for the post-deployment scripts directory
    pub scripts_dir: Option<PathBuf>,
    /// Home directory of the site (deployment tools, lock files)
    pub home_dir: PathBuf,
    /// Root of the deployed site content (functions and host configuration)
    pub site_root: PathBuf,
    /// External URL receiving a copy of the trigger payload, when configured
    pub trigger_artifact_url: Option<String>,
    /// When false, certificate validation is skipped and plain HTTP is used
    pub validate_ssl: bool,
}

impl DeploymentConfig {
    /// Read every recognized environment value once.
    pub fn from_env() -> Self {
        let home_dir = PathBuf::from(env::var("HOME").unwrap_or_else(|_| ".".to_string()));
        let site_root = home_dir.join("site/wwwroot");
        Self {
            host_name: non_empty(env::var("WEBSITE_HOSTNAME").ok()),
            local_authority: non_empty(env::var("LOCAL_CONTROL_PLANE_AUTHORITY").ok()),
            swap_slot_name: non_empty(env::var("WEBSITE_SWAP_SLOTNAME").ok()),
            home_stamp: non_empty(env::var("WEBSITE_HOME_STAMPNAME").ok()),
            instance_id: non_empty(env::var("WEBSITE_INSTANCE_ID").ok()),
            sku: non_empty(env::var("WEBSITE_SKU").ok()),
            command_timeout: env::var("SCM_COMMAND_IDLE_TIMEOUT")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs),
            scripts_dir: non_empty(env::var("SCM_POST_DEPLOYMENT_ACTIONS_PATH").ok())
                .map(PathBuf::from),
            home_dir,
            site_root,
            trigger_artifact_url: non_empty(env::var("WEBSITE_TRIGGER_ARTIFACT_URL").ok()),
            validate_ssl: !matches!(
                env::var("SKIP_SSL_VALIDATION").ok().as_deref(),
                Some("1") | Some("true")
            ),
        }
    }

    /// Whether the process runs inside the managed hosting environment
    pub fn is_managed_environment(&self) -> bool {
        self.instance_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Whether the site runs on the consumption (dynamic) SKU
    pub fn is_dynamic_sku(&self) -> bool {
        self.sku
            .as_deref()
            .is_some_and(|sku| sku.eq_ignore_ascii_case(DYNAMIC_SKU))
    }

    /// Effective per-script wall-clock budget
    pub fn script_timeout(&self) -> Duration {
        self.command_timeout.unwrap_or(DEFAULT_SCRIPT_TIMEOUT)
    }

    /// Directory holding operator-supplied post-deployment scripts
    pub fn post_deployment_scripts_dir(&self) -> PathBuf {
        self.scripts_dir
            .clone()
            .unwrap_or_else(|| self.home_dir.join(DEFAULT_SCRIPTS_SUBDIR))
    }

    /// Fixed path of the auto-swap lock sentinel
    pub fn swap_lock_path(&self) -> PathBuf {
        self.home_dir.join(SWAP_LOCK_SUBPATH)
    }

    /// Fixed temp-relative path of the pending-operation heartbeat marker
    pub fn pending_marker_path(&self) -> PathBuf {
        env::temp_dir().join(PENDING_MARKER_FILE)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
