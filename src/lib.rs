// src/lib.rs

//! healthsync: keeps a search index in sync with Kenyan health registries.

pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod search;
pub mod services;
pub mod storage;
pub mod utils;
