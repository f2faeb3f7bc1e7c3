//! # tr181-comparator: TR-181 data-model extraction and comparison
//!
//! A pipeline for pulling a device's TR-181 data model out of a live
//! endpoint (CWMP/TR-069 ACS session, or a generic REST-style device API)
//! and comparing the result against either another device or a
//! declarative operator requirement document.
//!
//! ## Core Concepts
//!
//! - **Node**: the atomic unit ([`node::Node`]) every stage operates on —
//!   a single TR-181 path with its type, access mode, value, and
//!   constraints.
//! - **Extractor**: a uniform [`extractor::Extractor`] trait two concrete
//!   implementations satisfy — [`cwmp::CwmpExtractor`] (recursive
//!   discovery over a CWMP-style hook) and [`generic::GenericExtractor`]
//!   (a flat listing from a device's own API).
//! - **Hook**: the transport seam ([`hook::Hook`]) an extractor drives;
//!   concrete transports register themselves in [`hook::HookRegistry`] by
//!   device type.
//! - **Comparator**: [`comparator::compare`] diffs two already-extracted
//!   node lists; [`enhanced::compare_enhanced`] layers per-node validation
//!   and, given a live hook, event/function conformance probes on top.
//! - **Requirement**: [`requirement::RequirementLoader`] loads/saves the
//!   declarative node list an operator authors by hand or generates from a
//!   reference device.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tr181_comparator::comparator::compare;
//! use tr181_comparator::cwmp::{CwmpConfig, CwmpExtractor};
//! use tr181_comparator::extractor::Extractor;
//! use tr181_comparator::hook::{DeviceConfig, Hook};
//!
//! # async fn run(hook: Arc<dyn Hook>, device: DeviceConfig, other_nodes: Vec<tr181_comparator::node::Node>, other_info: tr181_comparator::extractor::SourceInfo) -> Result<(), tr181_comparator::errors::CoreError> {
//! let extractor = CwmpExtractor::new(hook, device, CwmpConfig::default());
//! let outcome = extractor.extract().await?;
//!
//! let report = compare(
//!     extractor.source_info(),
//!     other_info,
//!     &outcome.nodes,
//!     &other_nodes,
//!     chrono::Utc::now(),
//!     0,
//! );
//! println!("{} differences found", report.differences.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Every fallible operation in this crate returns [`errors::CoreError`], a
//! `thiserror` + `miette::Diagnostic` enum: pipeline stages degrade via
//! [`degradation::PartialResult`] rather than aborting on a single failed
//! path, and transient failures are retried per [`retry::RetryConfig`]
//! before being embedded (with their attempt history) in the final error.
//!
//! ## Module guide
//!
//! - [`node`] — the TR-181 node model and path utilities
//! - [`errors`] — the crate's error taxonomy
//! - [`retry`] — exponential backoff with jitter
//! - [`degradation`] — partial-success accounting for batch operations
//! - [`validator`] — path syntax, type coercion, and range validation
//! - [`hook`] — the transport trait and its process-wide registry
//! - [`extractor`] — the uniform extraction interface and node-construction helpers
//! - [`cwmp`] — recursive CWMP/TR-069 extraction
//! - [`generic`] — flat-listing extraction for device REST APIs
//! - [`requirement`] — loading/saving operator requirement documents
//! - [`comparator`] — the base comparison engine
//! - [`enhanced`] — comparison plus validation and live conformance probing
//! - [`observability`] — structured events dual-emitted to sinks and `tracing`
//! - [`config`] — device/retry configuration layering and tracing setup

pub mod comparator;
pub mod config;
pub mod cwmp;
pub mod degradation;
pub mod enhanced;
pub mod errors;
pub mod extractor;
pub mod generic;
pub mod hook;
pub mod node;
pub mod observability;
pub mod requirement;
pub mod retry;
pub mod validator;
