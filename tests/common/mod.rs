//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::Workspace;
//!
//! #[test]
//! fn test_build() {
//!     let workspace = Workspace::new();
//!     workspace.write_scripts(true, "12");
//!     song_master::run_build(&workspace.config("out")).unwrap();
//! }
//! ```

#[allow(dead_code)]
mod constants;
mod fixtures;

pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{act_js, chart_ids, title_js, Workspace, DATA_JS};
