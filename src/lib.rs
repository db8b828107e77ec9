// src/lib.rs — Library root for habitual

pub mod api;
pub mod cli;
pub mod engine;
pub mod infra;
pub mod mining;
pub mod source;
pub mod storage;
