#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch orchestration for the ward patrol allocation toolchain.
//!
//! [`config`] loads the TOML run configuration and applies command-line
//! overrides; [`pipeline`] runs one batch (allocation, per-period split, or
//! containment build) from that configuration.

pub mod config;
pub mod pipeline;
