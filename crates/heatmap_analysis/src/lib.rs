//! Static struct member access heatmap.
//!
//! Starting from the program entry, every reachable address computation that
//! navigates into a named structure is attributed to a `(struct, field)`
//! bucket. The pipeline is:
//!
//! walker -> classifier -> resolver -> frequency table -> report
//!
//! The analysis is best effort. Anything it cannot attribute (non-constant
//! indices, unnamed aggregates, indirect calls) is skipped without error.

pub mod access;
pub mod classifier;
pub mod pass;
pub mod report;
pub mod resolver;
pub mod table;
pub mod walker;

pub use access::{AccessOrigin, AccessSink, FieldAccess};
pub use classifier::{ClassifiedChain, classify};
pub use pass::{HeatmapPass, analyze_module, analyze_module_parallel};
pub use report::{REPORT_HEADER, render, write_report};
pub use resolver::Resolver;
pub use table::{FrequencyTable, SharedFrequencyTable};
pub use walker::Walker;

pub use heatmap_config::{AnalysisOptions, Profile, Scope};
