// src/lib.rs

//! Incremental harvester for the Bangumi catalog and collection API

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
