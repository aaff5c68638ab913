pub mod tool_runner;

pub use tool_runner::{ConversionMode, ToolRun, ToolRunner};
