//! WebRefiner Rule Loader
//!
//! This crate turns rule list text into `wr_core::RuleSet`s.

pub mod error;
pub mod loader;
pub mod optimizer;
pub mod parser;

pub use error::{LineError, LoadError};
pub use loader::{
    compile_source, load_rule_sets, CompiledSource, LoadOptions, LoadReport, RuleSource, RuleText,
    SourceStats,
};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{parse_rule_line, parse_rule_list, ParsedList, ParsedRule, RejectedLine};
