//! favarc - incremental archiver for favorited posts
//!
//! This crate provides the core functionality for the `favarc` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Record, YearMonth)
//! - [`storage`] - SQLite Record Store
//! - [`sync`] - Sync engine, stop policies, dirty tracking, partition export
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
