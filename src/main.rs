// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup preflight for the custody core.
//!
//! Loads configuration, opens the custody database and probes the enclave.
//! Exits non-zero if any step fails, so it can gate a deployment.

use std::process::ExitCode;

use relational_custody_core::config::CustodyConfig;
use relational_custody_core::enclave::CallContext;
use relational_custody_core::telemetry::init_tracing;
use relational_custody_core::CustodyService;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match CustodyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(config.log_format);

    tracing::info!(
        data_dir = %config.data_dir.display(),
        enclave_url = %config.enclave_url,
        timeout_secs = config.enclave_timeout.as_secs(),
        "Starting custody preflight"
    );

    let service = match CustodyService::from_config(&config) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize custody service");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling enclave probe");
                shutdown.cancel();
            }
        });
    }

    let call = CallContext::new(shutdown).with_timeout(config.enclave_timeout);
    match service.probe_enclave(&call).await {
        Ok(info) => {
            tracing::info!(
                enclave_id = %info.enclave_id,
                version = %info.version,
                capabilities = ?info.capabilities,
                healthy = info.healthy,
                "Enclave reachable"
            );
            if info.healthy {
                ExitCode::SUCCESS
            } else {
                tracing::error!("Enclave reports itself unhealthy");
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                retryable = e.is_retryable(),
                "Enclave probe failed"
            );
            ExitCode::FAILURE
        }
    }
}
