// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool proxy: a local HTTP service that runs a whitelist of host CLIs on
//! behalf of containers, so host credentials never enter a container.
//!
//! Containers reach it at `http://host.docker.internal:{port}`. On startup
//! the daemon prefers probe-then-adopt: if something already answers
//! `/health` on the port it is an earlier instance's proxy and is reused;
//! killing the holder is an explicit user action, never automatic.

use crate::subprocess::{run_with_timeout, PROXY_CMD_TIMEOUT};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

/// Default listen port. Containers are told about it via env.
pub const DEFAULT_PROXY_PORT: u16 = 9847;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("port {0} in use and holder is not a healthy proxy")]
    PortUnavailable(u16),

    #[error("bind failed: {0}")]
    Bind(std::io::Error),
}

/// Request body for `/gh/*` routes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GhRequest {
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

/// Stable wire schema shared with containers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Audit record for one proxied invocation.
#[derive(Debug, Clone)]
pub struct GhAudit {
    pub subcommand: Vec<String>,
    pub exit_code: Option<i32>,
}

pub(crate) struct ProxyShared {
    pub(crate) audit: Option<mpsc::Sender<GhAudit>>,
}

enum ProxyState {
    Stopped,
    /// We own the listener.
    Serving { token: CancellationToken },
    /// A healthy proxy from another instance holds the port.
    Adopted,
}

/// Lifecycle handle for the proxy server.
pub struct ToolProxy {
    port: u16,
    shared: Arc<ProxyShared>,
    state: Mutex<ProxyState>,
}

impl ToolProxy {
    pub fn new(port: u16, audit: Option<mpsc::Sender<GhAudit>>) -> Self {
        Self {
            port,
            shared: Arc::new(ProxyShared { audit }),
            state: Mutex::new(ProxyState::Stopped),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// URL containers use to reach the proxy.
    pub fn container_url(&self) -> String {
        format!("http://host.docker.internal:{}", self.port)
    }

    pub fn is_running(&self) -> bool {
        !matches!(*self.state.lock(), ProxyState::Stopped)
    }

    /// Bind and serve, or adopt a healthy proxy already on the port.
    /// Idempotent while running.
    pub async fn start(&self) -> Result<(), ProxyError> {
        if self.is_running() {
            return Ok(());
        }

        let listener = match TcpListener::bind(("0.0.0.0", self.port)).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if probe_health(self.port).await {
                    tracing::info!(port = self.port, "adopting existing healthy tool proxy");
                    *self.state.lock() = ProxyState::Adopted;
                    return Ok(());
                }
                return Err(ProxyError::PortUnavailable(self.port));
            }
            Err(e) => return Err(ProxyError::Bind(e)),
        };

        let token = CancellationToken::new();
        let app = router(Arc::clone(&self.shared));
        let shutdown = token.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "tool proxy server error");
            }
        });

        tracing::info!(port = self.port, "tool proxy listening");
        *self.state.lock() = ProxyState::Serving { token };
        Ok(())
    }

    /// Stop serving, draining in-flight requests. Adopted proxies are left
    /// running — they belong to another instance.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let ProxyState::Serving { token } = &*state {
            token.cancel();
        }
        *state = ProxyState::Stopped;
    }

    /// Kill whatever holds the port. Explicit user action only.
    pub async fn kill_port_holder(&self) -> Result<(), ProxyError> {
        let mut cmd = Command::new("lsof");
        cmd.args(["-ti", &format!("tcp:{}", self.port)]);
        let output = run_with_timeout(cmd, Duration::from_secs(5), "lsof")
            .await
            .map_err(|_| ProxyError::PortUnavailable(self.port))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        for pid in stdout.lines().filter_map(|l| l.trim().parse::<i32>().ok()) {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid),
                nix::sys::signal::Signal::SIGKILL,
            );
            tracing::warn!(pid, port = self.port, "killed tool-proxy port holder");
        }
        Ok(())
    }
}

pub(crate) fn router(shared: Arc<ProxyShared>) -> Router {
    let routes: [(&str, &[&str]); 6] = [
        ("/gh/pr/create", &["pr", "create"]),
        ("/gh/pr/view", &["pr", "view"]),
        ("/gh/pr/list", &["pr", "list"]),
        ("/gh/issue/create", &["issue", "create"]),
        ("/gh/issue/view", &["issue", "view"]),
        ("/gh/api", &["api"]),
    ];

    let mut app = Router::new().route("/health", get(health));
    for (path, prefix) in routes {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        app = app.route(
            path,
            post(move |state: State<Arc<ProxyShared>>, Json(req): Json<GhRequest>| {
                gh_handler(state, prefix.clone(), req)
            }),
        );
    }
    // The caller is a container on the same host; no origin is wrong here.
    app.layer(CorsLayer::permissive()).with_state(shared)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

async fn gh_handler(
    State(shared): State<Arc<ProxyShared>>,
    prefix: Vec<String>,
    req: GhRequest,
) -> Json<GhResponse> {
    let mut args = prefix.clone();
    args.extend(req.args.iter().cloned());
    let response = run_gh(&args, req.stdin.as_deref()).await;

    if let Some(ref audit) = shared.audit {
        let _ = audit
            .send(GhAudit { subcommand: args, exit_code: response.exit_code })
            .await;
    }
    Json(response)
}

async fn run_gh(args: &[String], stdin: Option<&str>) -> GhResponse {
    let mut cmd = Command::new("gh");
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
    cmd.kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return GhResponse {
                success: false,
                error: Some(format!("spawn gh: {}", e)),
                ..Default::default()
            }
        }
    };

    if let (Some(input), Some(mut handle)) = (stdin, child.stdin.take()) {
        let input = input.to_string();
        tokio::spawn(async move {
            let _ = handle.write_all(input.as_bytes()).await;
        });
    }

    let waited = tokio::time::timeout(PROXY_CMD_TIMEOUT, child.wait_with_output()).await;
    match waited {
        Ok(Ok(output)) => {
            let exit_code = output.status.code();
            GhResponse {
                success: output.status.success(),
                stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
                stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
                exit_code,
                error: None,
            }
        }
        Ok(Err(e)) => GhResponse {
            success: false,
            error: Some(format!("gh failed: {}", e)),
            ..Default::default()
        },
        Err(_) => GhResponse {
            success: false,
            error: Some("gh timed out".to_string()),
            ..Default::default()
        },
    }
}

/// GET `/health` on localhost with a hand-rolled HTTP/1.1 client.
/// `{"success":true}` in the body means a live proxy instance.
pub async fn probe_health(port: u16) -> bool {
    let connect = TcpStream::connect(("127.0.0.1", port));
    let Ok(Ok(mut stream)) = tokio::time::timeout(Duration::from_secs(2), connect).await
    else {
        return false;
    };

    let request = "GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
    if stream.write_all(request.as_bytes()).await.is_err() {
        return false;
    }

    let mut response = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response));
    if read.await.is_err() {
        return false;
    }
    let text = String::from_utf8_lossy(&response);
    text.contains("200") && text.contains("\"success\":true")
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
