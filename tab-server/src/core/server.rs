//! Server Implementation
//!
//! WebSocket + 诊断 HTTP 共用一个监听端口

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::api::build_router;
use crate::core::{Config, Result, ServerError, ServerState};

pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    fn state(&self) -> ServerState {
        match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config),
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        };
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `signal` resolves
    pub async fn serve<F>(&self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = self.state();
        state.start_background_tasks().await;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(e.into()))?;
        tracing::info!("🦀 Tab sync server listening on {}", local_addr);

        let app = build_router(state.clone());
        let token = state.shutdown_token();
        let graceful = async move {
            tokio::select! {
                _ = signal => {}
                _ = token.cancelled() => {}
            }
            // 通知 ws 会话关闭，让 axum 的 graceful shutdown 不被长连接阻塞
            token.cancel();
        };

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful)
        .await;

        state.shutdown().await;
        result.map_err(|e| ServerError::Internal(e.into()))
    }
}
