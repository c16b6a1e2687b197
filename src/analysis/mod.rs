pub mod parser;
pub mod report;

pub use parser::{parse_analysis, AnalysisResult, Section};
pub use report::Tab;
