//! 命令层：从模型输出中提取命令、按能力与互斥规则分派

pub mod dispatch;
pub mod extractor;
pub mod markup;

pub use dispatch::{CommandDispatcher, CommandOutcome, DispatchReport, TurnContext};
pub use extractor::{extract, Command, Extraction, ExtractionError};
