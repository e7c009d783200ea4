//! Core library modules for putusan-dl
//!
//! This module contains the internal implementation of the harvesting pipeline.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod gate;
pub mod pipeline;
pub mod stage;
pub mod storage;

