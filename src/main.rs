//! Hive - 多角色编排内核
//!
//! 入口：初始化日志、加载配置、构建编排器，然后从标准输入逐行读取用户消息。

use anyhow::Context;
use hive::core::create_orchestrator_builder;
use hive::observability;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let orchestrator = create_orchestrator_builder(config_path)
        .build()
        .context("Failed to build orchestrator")?;
    let mut session = orchestrator.new_session();
    tracing::info!(session = %session.id(), "session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }
        let reply = orchestrator.handle_message(&mut session, line).await;
        stdout.write_all(format!("{reply}\n> ").as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
