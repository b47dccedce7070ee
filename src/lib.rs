//! Cloud spend by service, normalized across AWS Cost Explorer and the GCP
//! billing export, rendered as a table, JSON or CSV.

pub mod cli;
pub mod config;
pub mod providers;
pub mod services;
pub mod types;
