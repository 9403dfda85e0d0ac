use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

use crate::classification::{Classifier, VpnApiProvider};
use crate::configuration::config::Config;
use crate::controller::monitor::{Monitor, MonitorSettings};
use crate::error_handling::types::*;
use crate::ledger::open_ledger;
use crate::plex::PlexClient;
use crate::web_interface::WebServer;

/// Owns the wired-up components for one process run.
pub struct Controller {
    pub config: Config,
    monitor: Monitor,
}

impl Controller {
    /// Builds every component from an already validated configuration.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        let plex = Arc::new(
            PlexClient::new(
                &config.plex_url,
                &config.plex_token,
                &config.termination_reason,
                config.request_timeout(),
            )
            .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?,
        );
        let provider = Arc::new(
            VpnApiProvider::new(&config.vpn_api_url, &config.vpn_api_key, config.request_timeout())
                .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?,
        );
        let classifier = Arc::new(
            Classifier::new(provider, config.cache_ttl(), config.request_timeout())
                .with_test_blocked_ip(config.test_blocked_ip)
                .with_trusted_ranges(config.trusted_ranges.clone()),
        );
        let ledger = open_ledger(&config.ledger).await.map_err(|e| {
            error!("Unable to open the {:?} ledger: {}", config.ledger.backend, e);
            ControllerError::LedgerError(e)
        })?;

        if let Some(address) = config.test_blocked_ip {
            warn!("Test address {} will always be treated as a VPN", address);
        }

        let monitor = Monitor::new(
            plex.clone(),
            plex,
            classifier,
            ledger,
            MonitorSettings::from_config(&config),
        );
        Ok(Self { config, monitor })
    }

    /// Serves HTTP and runs the poll loop until SIGINT/SIGTERM or a fatal
    /// monitor error. The web server stops together with the loop.
    pub async fn run(self) -> Result<(), ControllerError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let web_server = WebServer::new(self.monitor.clone(), self.config.webhook_enabled);
        let mut web_shutdown = shutdown_rx.clone();
        let (bound, server) = web_server.bind(addr, async move {
            let _ = web_shutdown.changed().await;
        })?;
        info!("HTTP interface listening on {}", bound);
        let server_task = tokio::spawn(server);

        let monitor = self.monitor.clone();
        let mut monitor_task = tokio::spawn(async move { monitor.run(shutdown_rx).await });

        let joined = tokio::select! {
            joined = &mut monitor_task => joined,
            _ = wait_for_signal() => {
                info!("Termination signal received, shutting down");
                let _ = shutdown_tx.send(true);
                monitor_task.await
            }
        };

        let _ = shutdown_tx.send(true);
        if let Err(e) = server_task.await {
            warn!("Web server task ended abnormally: {}", e);
        }

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ControllerError::MonitorError(e)),
            Err(e) => Err(ControllerError::TaskFailed(e.to_string())),
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
