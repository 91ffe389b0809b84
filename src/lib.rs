//! OtcBot Library
//!
//! Momentum-driven binary options session bot for OTC currency pairs

pub mod config;
pub mod controller;
pub mod execution;
pub mod pairs;
pub mod persistence;
pub mod risk;
pub mod session;
pub mod strategy;
pub mod types;
