//! acctsync - bulk Account sync between CSV files and the CRM
//!
//! This crate provides the core functionality for the `acctsync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Fixed account schema and AnnualRevenue normalization
//! - [`validate`] - Structural row checks
//! - [`sync`] - Codec, batch planner, engine and reporter
//! - [`remote`] - Remote record store trait and REST/Bulk API client
//! - [`config`] - Credential profiles and run settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
