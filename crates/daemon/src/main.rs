// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `bismarkd` — the Bismark orchestration daemon.

use bm_daemon::{lifecycle, Config};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() -> std::process::ExitCode {
    let config = Config::load();

    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("cannot create log dir {}: {}", config.log_dir.display(), e);
        return std::process::ExitCode::FAILURE;
    }
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "daemon.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "tokio runtime creation failed");
            return std::process::ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let (daemon, listener) = match lifecycle::startup(config) {
            Ok(up) => up,
            Err(e) => {
                tracing::error!(error = %e, "startup failed");
                return std::process::ExitCode::FAILURE;
            }
        };

        let listener_task = tokio::spawn(listener.run());

        // Run until a shutdown request or a termination signal.
        let shutdown = daemon.shutdown.clone();
        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!("shutdown requested over the socket");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
            }
            _ = sigterm() => {
                tracing::info!("termination signal received");
            }
        }

        listener_task.abort();
        daemon.shutdown_now();
        std::process::ExitCode::SUCCESS
    })
}

async fn sigterm() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "sigterm handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}
