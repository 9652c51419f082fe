//! Palisade Policy - per-tool manifests and call screening.
//!
//! Three independent lines of defense applied by the supervisor before a
//! call is dispatched:
//!
//! 1. [`CapabilityVerifier`] - denies calls whose manifest requires a
//!    capability outside the deployment allow-list.
//! 2. [`sanitize`] - redacts sensitive-looking argument values.
//! 3. [`compute_risk`] - classifies a call as low/medium/high from tool
//!    identity plus argument heuristics, independent of the manifest.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod capability;
pub mod manifest;
pub mod risk;
pub mod sanitize;

pub use capability::{CapabilityCheck, CapabilityVerifier, KNOWN_CAPABILITIES};
pub use manifest::ToolManifest;
pub use risk::compute_risk;
pub use sanitize::{sanitize, REDACTED};
