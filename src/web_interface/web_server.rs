use std::future::Future;
use std::net::SocketAddr;

use log::error;
use warp::{Filter, Rejection, Reply};

use super::routes::{dashboard_route, health_route, ledger_route, webhook_route};
use crate::controller::Monitor;
use crate::error_handling::types::WebError;

/// HTTP interface: health, ledger listing and the Plex webhook receiver
pub struct WebServer {
    monitor: Monitor,
    webhook_enabled: bool,
}

impl WebServer {
    pub fn new(monitor: Monitor, webhook_enabled: bool) -> Self {
        Self {
            monitor,
            webhook_enabled,
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        dashboard_route()
            .or(health_route(self.monitor.clone()))
            .or(ledger_route(self.monitor.clone()))
            .or(webhook_route(self.monitor.clone(), self.webhook_enabled))
            .with(warp::log("plex_vpn_blocker::http"))
    }

    /// Binds the listener and returns the server future, which completes
    /// once `shutdown` resolves and open requests are done.
    pub fn bind<F>(
        &self,
        addr: SocketAddr,
        shutdown: F,
    ) -> Result<(SocketAddr, impl Future<Output = ()>), WebError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| {
                error!("Failed to bind web server to {}: {}", addr, e);
                WebError::BindFailed(format!("{}: {}", addr, e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::test_support::*;
    use warp::http::StatusCode;

    fn server(webhook_enabled: bool) -> WebServer {
        let h = harness(FakeSource::new(Ok(Vec::new())), FakeEnforcer::default(), settings());
        WebServer::new(h.monitor, webhook_enabled)
    }

    #[tokio::test]
    async fn routes_are_mounted() {
        let routes = server(true).routes();

        let res = warp::test::request().path("/").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = warp::test::request().path("/health").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = warp::test::request().path("/ledger").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = warp::test::request().path("/missing").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_webhook_body_is_rejected() {
        let routes = server(true).routes();
        let res = warp::test::request()
            .method("POST")
            .path("/webhook")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes)
            .await;
        assert!(res.status().is_client_error());
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let result = server(false).bind(addr, async {});
        assert!(matches!(result, Err(WebError::BindFailed(_))));
    }
}
