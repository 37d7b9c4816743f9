//! # Control Plane
//!
//! Hardened HTTP invocation path for the hosting platform's management
//! endpoint.
//!
//! Requests must reach the control plane despite transient DNS propagation
//! gaps on newly created sites and transient request failure: name
//! resolution degrades to a regional fallback address (with the original
//! Host preserved for virtual-host routing), and restart-class calls are
//! wrapped in a fixed-interval retry.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod client;
mod error;
mod resolver;
mod retry;

pub use client::{
    ClientConfig, ControlPlaneClient, REQUEST_ID_HEADER, SITE_RESTRICTED_TOKEN_HEADER, TokenSigner,
};
pub use error::{Error, Result};
pub use resolver::{AddressResolver, Resolve};
pub use retry::{Attempted, attempt};
