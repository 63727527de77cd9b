//! # Shorts Common Library
//!
//! Shared code for the shorts-creator binaries:
//! - Story and evaluation models
//! - Record store capability with SQLite and PostgreSQL backends
//! - TOML configuration loading
//! - Tracing initialization

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use error::{Error, Result};
pub use models::{Audience, Category, Evaluation, Item};
