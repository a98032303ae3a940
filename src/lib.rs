//! Assetpipe - front-end asset pipeline
//!
//! This library provides:
//! - Composable file transforms (image compression, CSS prefixing and
//!   minification, external compilers, source maps, renames)
//! - Pipelines that run transforms over a glob-selected file set in parallel
//! - Named tasks with series/parallel composition
//! - A development server with file watching and live reload

pub mod build;
pub mod cli;
pub mod config;
pub mod logging;
pub mod mode;
pub mod serve;
pub mod tasks;
pub mod transform;
pub mod watch;
