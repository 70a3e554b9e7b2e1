//! 工具层：注册表、带超时与审计的执行器、沙箱文档工具

pub mod executor;
pub mod filesystem;
pub mod registry;

pub use executor::ToolExecutor;
pub use filesystem::{DocumentTool, SafeFs};
pub use registry::{Tool, ToolRegistry, ToolRequest};
