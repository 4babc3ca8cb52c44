//! Shared code for the `gauth` and `gcontacts` executables.

pub mod cli;
pub mod common;
pub mod output;

pub use common::{report, CliError, Context};
pub use output::{render_list, render_record, OutputFormat, Tabular};
