//! Runtime module
//!
//! A "runtime" is a named remote cluster the agent manages workloads on.
//! This module covers everything between the runtimes document and a
//! ready-to-use cluster client:
//! - Decoding the credential bundle into per-runtime configuration
//! - The cluster client abstraction and its kube-backed implementation
//! - The registry that lazily connects each runtime exactly once

mod bundle;
mod client;
pub mod mock;
mod registry;

pub use bundle::*;
pub use client::*;
pub use registry::*;
