//! fsconform: a conformance verification harness for filesystem-like
//! storage implementations.
//!
//! A candidate implements the [`store::Store`] trait (with symbolic links
//! as an optional, queryable capability), declares what it supports in a
//! [`features::Features`] record, and the harness decides mechanically
//! whether it behaves like a reference POSIX-style filesystem for the
//! capabilities it claims:
//!
//! - [`suite::run_suite`] drives the capability-gated baseline groups and
//!   collects a hierarchical [`report::RunReport`];
//! - [`suite::quick_check`] is the fast smoke path;
//! - [`wrapper::verify_wrapper`] validates a transformation layer over a
//!   base store against its [`wrapper::TransformContract`];
//! - [`fuzz::run_all`] drives the same primitives under corpus-seeded,
//!   mutated input and minimizes anything that breaks an invariant.
//!
//! The [`host::HostStore`] adapter confines a store namespace to a host
//! directory and serves as the reference candidate.

#![feature(io_error_more)]

pub mod cli;
pub mod errors;
pub mod features;
pub mod fuzz;
pub mod host;
pub mod report;
pub mod resolve;
pub mod store;
pub mod suite;
pub mod wrapper;

#[cfg(test)]
mod testutil;
mod util;
