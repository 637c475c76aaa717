//! Core domain types and logic.

pub mod account;
pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod feature;
pub mod feature_builder;
pub mod ledger;
pub mod metrics;
pub mod order;
pub mod rolling;
pub mod strategy;
