//! Build pipeline module for assetpipe
//!
//! Provides the file-level machinery every task is built on.
//!
//! # Overview
//!
//! - **Discovery**: Resolve glob patterns into a [`FileSet`]
//! - **Pipeline**: Run each file through an ordered list of transforms
//! - **Result**: Per-file status, outputs and findings
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::{Pipeline, Sources};
//! use assetpipe::transform::Rename;
//!
//! let files = Sources::globs("src", &["js/*.js".to_string()]).resolve()?;
//! let result = Pipeline::new("scripts", "dist/js").pipe(Rename::suffix(".min")).run(&files)?;
//! println!("{}", result.summary());
//! ```

pub mod context;
pub mod discovery;
pub mod pipeline;
pub mod result;

pub use context::*;
pub use discovery::*;
pub use pipeline::*;
pub use result::*;
