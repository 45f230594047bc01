//! HTTP surface: tracking, postbacks, health and the admin API

pub mod middleware;
pub mod services;
