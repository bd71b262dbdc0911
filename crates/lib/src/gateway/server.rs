//! Gateway HTTP server: Bot Framework messaging endpoint plus a health probe.

use crate::analysis::HttpAnalysisClient;
use crate::bot::{Bot, TurnContext};
use crate::channels::{Activity, BotConnector, ConversationRef, MessageSender};
use crate::config::{self, Config};
use crate::dispatch::{Dispatcher, LogTrace};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared state for the gateway (config, bot, outbound sender).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub bot: Arc<Bot>,
    pub sender: Arc<dyn MessageSender>,
    pub analysis_url: String,
}

impl GatewayState {
    /// Wire up the HTTP analysis client and the Bot Framework connector from config.
    pub fn from_config(config: Config) -> Self {
        let analysis_url = config::resolve_analysis_url(&config);
        let analysis = HttpAnalysisClient::new(Some(analysis_url.clone()));
        let dispatcher = Dispatcher::new(Arc::new(LogTrace::new(config.debug)));
        let sender = BotConnector::new(config.bot_framework.credentials())
            .with_trusted_hosts(config.bot_framework.trusted_service_hosts.clone());
        Self {
            config: Arc::new(config),
            bot: Arc::new(Bot::new(Arc::new(analysis), dispatcher)),
            sender: Arc::new(sender),
            analysis_url,
        }
    }
}

/// Routes: `GET /` health, `POST /api/messages` activities.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/api/messages", post(messages))
        .with_state(state)
}

/// Run the gateway server; binds to config.server.bind:config.server.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    let port = config.server.port;
    if !config::is_loopback_bind(&bind) && config.bot_framework.credentials().is_some() {
        log::warn!(
            "binding to {} with Bot Framework app credentials; inbound activities are not authenticated, \
             replies go only to trusted service hosts: {}",
            bind,
            config.bot_framework.trusted_service_hosts.join(", ")
        );
    }
    let state = GatewayState::from_config(config);
    log::info!("analysis service: {}", state.analysis_url);
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight turns");
}

/// POST /api/messages — one Bot Framework activity per request. The turn runs to completion
/// (including the error notice) before the response is returned.
async fn messages(State(state): State<GatewayState>, body: Bytes) -> StatusCode {
    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(a) => a,
        Err(e) => {
            log::debug!("messages: rejecting malformed activity: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    let Some(conversation) = ConversationRef::from_activity(&activity) else {
        log::debug!("messages: activity without serviceUrl or conversation");
        return StatusCode::BAD_REQUEST;
    };
    log::debug!(
        "messages: {} activity on {}",
        activity.kind,
        conversation.channel_id
    );
    let ctx = TurnContext::new(conversation, state.sender.as_ref());
    state.bot.handle(&ctx, &activity).await;
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.server.port,
        "analysisUrl": state.analysis_url,
    }))
}
