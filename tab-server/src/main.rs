use tab_server::{Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 日志) 并加载配置
    let config = setup_environment()?;

    print_banner();
    tracing::info!(
        environment = %config.environment,
        strict_totals = config.strict_totals,
        "🦀 Tab sync server starting..."
    );

    // 2. 初始化服务器状态
    let state = ServerState::initialize(&config);

    // 3. 启动服务器 (serve 会启动后台任务，Ctrl-C 优雅退出)
    let server = Server::with_state(config, state);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
