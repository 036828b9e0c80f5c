//! Opinion rooms condensed into five-option polls, with voting and tallies.

pub mod aggregator;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod state;
pub mod types;
pub mod voter;
