//! Hive - 多角色编排内核
//!
//! 模块划分：
//! - **command**: 从模型输出中提取命令，按能力与互斥规则分派
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排状态机、会话、错误与恢复、构建器
//! - **llm**: 模型客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 聊天记录、计划、上下文条目与装配、长期记忆、检索
//! - **observability**: tracing 初始化
//! - **react**: 单轮调用、规划、评审、执行与回复循环
//! - **roles**: 角色、阶段能力、命令说明
//! - **tools**: 工具注册、带超时与审计的执行器、沙箱文件访问

pub mod command;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod roles;
pub mod tools;

pub use crate::core::{Orchestrator, OrchestratorBuilder, Session};
