//! Name resolution with a regional fallback strategy

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tracing::{debug, warn};

/// Known regional domain families and the fallback suffix for each.
const FALLBACK_SUFFIXES: [(&str, &str); 4] = [
    (".scm.azurewebsites.net", ".cloudapp.net"),
    (".scm.azurewebsites.us", ".usgovcloudapp.net"),
    (".scm.chinacloudsites.cn", ".chinacloudapp.cn"),
    (".scm.azurewebsites.de", ".azurecloudapp.de"),
];

/// Suffix for the public-cloud family, used when no family matches.
const DEFAULT_FALLBACK_SUFFIX: &str = ".cloudapp.net";

/// Seam for host resolution so callers can be tested with a fixed mapping.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolve `host`; `Some(addr)` means the caller must send to the
    /// fallback address while preserving `host` for virtual-host routing.
    /// `None` means the hostname can be used directly.
    async fn resolve(&self, host: &str) -> Option<IpAddr>;
}

/// Resolves a hostname, degrading to a home-stamp fallback address when
/// standard resolution fails.
///
/// Never errors: every failure degrades to "use the hostname directly".
pub struct AddressResolver {
    home_stamp: Option<String>,
}

impl AddressResolver {
    /// Create a resolver with the platform home-stamp identity, when known
    pub fn new(home_stamp: Option<String>) -> Self {
        Self { home_stamp }
    }
}

#[async_trait]
impl Resolve for AddressResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(mut addrs) = lookup_host((host, 0u16)).await {
            if addrs.next().is_some() {
                return None;
            }
        }

        let stamp = self.home_stamp.as_deref()?;
        let fallback = fallback_host(host, stamp);
        debug!(%host, %fallback, "primary resolution failed, trying fallback host");
        match lookup_host((fallback.as_str(), 0u16)).await {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(e) => {
                warn!(%host, %fallback, error = %e, "fallback resolution failed");
                None
            }
        }
    }
}

/// Derive the fallback hostname for `host` from the home stamp.
///
/// The domain suffix of `host` is matched against the known regional
/// families; unmatched hosts fall back to the public-cloud family.
fn fallback_host(host: &str, stamp: &str) -> String {
    let lower = host.to_ascii_lowercase();
    let suffix = FALLBACK_SUFFIXES
        .iter()
        .find(|(family, _)| lower.ends_with(family))
        .map(|(_, fallback)| *fallback)
        .unwrap_or(DEFAULT_FALLBACK_SUFFIX);
    format!("{stamp}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_host_regional_families() {
        assert_eq!(
            fallback_host("site.scm.azurewebsites.us", "waws-prod-bay-001"),
            "waws-prod-bay-001.usgovcloudapp.net"
        );
        assert_eq!(
            fallback_host("site.scm.chinacloudsites.cn", "stamp"),
            "stamp.chinacloudapp.cn"
        );
        assert_eq!(
            fallback_host("site.scm.azurewebsites.de", "stamp"),
            "stamp.azurecloudapp.de"
        );
        assert_eq!(
            fallback_host("site.scm.azurewebsites.net", "stamp"),
            "stamp.cloudapp.net"
        );
    }

    #[test]
    fn test_fallback_host_defaults_to_public_cloud() {
        assert_eq!(
            fallback_host("site.example.com", "stamp"),
            "stamp.cloudapp.net"
        );
    }

    #[test]
    fn test_fallback_host_is_case_insensitive() {
        assert_eq!(
            fallback_host("SITE.SCM.AZUREWEBSITES.US", "stamp"),
            "stamp.usgovcloudapp.net"
        );
    }

    #[tokio::test]
    async fn test_resolvable_host_needs_no_fallback() {
        let resolver = AddressResolver::new(Some("stamp".to_string()));
        assert_eq!(resolver.resolve("localhost").await, None);
    }

    #[tokio::test]
    async fn test_unresolvable_host_without_stamp_gives_up() {
        let resolver = AddressResolver::new(None);
        assert_eq!(resolver.resolve("unresolvable.invalid").await, None);
    }
}
