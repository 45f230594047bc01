//! Attributor - click attribution and conversion postback service
//!
//! Records ad clicks with their tracking macros, matches advertiser
//! conversions back to clicks, keeps a revenue/cost ledger per campaign and
//! forwards conversions to the Facebook Conversions API and Google Ads.
//!
//! # Architecture
//! - `storage`: SeaORM store (SQLite / MySQL / PostgreSQL) and domain models
//! - `services`: attribution, matching, ledger, dispatch and retry
//! - `api`: HTTP handlers and middleware
//! - `config`: TOML + environment configuration
//! - `runtime`: startup, shutdown and execution modes
//! - `system`: logging

pub mod api;
pub mod config;
pub mod errors;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
