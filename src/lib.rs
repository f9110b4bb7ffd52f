pub mod analyzer;
pub mod benchmark;
pub mod config;
pub mod detector;
pub mod error;
pub mod monitor;
pub mod pricing;
pub mod ranker;
pub mod stats;
pub mod store;
pub mod tasks;
pub mod types;

#[cfg(test)]
mod fixtures;
