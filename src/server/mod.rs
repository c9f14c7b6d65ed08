//! HTTP listener as a startup module
//!
//! `initialize` assembles the router, `start` binds and serves in the
//! background, `stop` drains in-flight requests and waits for the server task.

mod health;

pub use health::{HealthReport, health_router};

use crate::di::{ResourceRegistry, tokens};
use crate::lifecycle::{HealthRegistry, LifecycleError, StartupModule};
use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

const MODULE_NAME: &str = "web";

pub struct WebServerModule {
    addr: String,
    routes: Vec<Router>,
    router: Option<Router>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl WebServerModule {
    /// Listen on `addr`, e.g. `0.0.0.0:3000`. Port `0` picks a free port.
    pub fn new(addr: impl Into<String>) -> Self {
        let (bound, _) = watch::channel(None);
        Self {
            addr: addr.into(),
            routes: Vec::new(),
            router: None,
            shutdown: None,
            server: None,
            bound,
        }
    }

    /// Serve `router` next to `/health`.
    #[must_use]
    pub fn merge(mut self, router: Router) -> Self {
        self.routes.push(router);
        self
    }

    /// The bound address, published once the listener is up.
    pub fn local_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.bound.subscribe()
    }
}

#[async_trait]
impl StartupModule for WebServerModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    async fn initialize(&mut self, registry: &ResourceRegistry) -> Result<(), LifecycleError> {
        let health = registry
            .resolve::<HealthRegistry>(tokens::HEALTH)
            .map_err(|e| LifecycleError::init_failed(format!("Web server needs health: {}", e)))?;

        let router = self
            .routes
            .drain(..)
            .fold(health_router(health), |router, extra| router.merge(extra))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
        self.router = Some(router);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), LifecycleError> {
        let router = self
            .router
            .take()
            .ok_or_else(|| LifecycleError::start_failed(MODULE_NAME, "router not initialized"))?;

        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| LifecycleError::start_failed(MODULE_NAME, format!("bind {}: {}", self.addr, e)))?;
        let local = listener
            .local_addr()
            .map_err(|e| LifecycleError::start_failed(MODULE_NAME, e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.server = Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
        }));
        self.shutdown = Some(tx);
        self.bound.send_replace(Some(local));

        tracing::info!("HTTP server listening on {}", local);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LifecycleError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(server) = self.server.take() else {
            return Ok(());
        };
        self.bound.send_replace(None);

        match server.await {
            Ok(Ok(())) => {
                tracing::info!("HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(LifecycleError::shutdown_failed(format!("HTTP server: {}", e))),
            Err(e) => Err(LifecycleError::shutdown_failed(format!("HTTP server task: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{RegistryBuilder, ResourceRegistration};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn registry(health: Arc<HealthRegistry>) -> ResourceRegistry {
        let mut builder = RegistryBuilder::new();
        builder.register(ResourceRegistration::shared(tokens::HEALTH, health));
        builder.build().unwrap()
    }

    async fn get_health(router: Router) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_components() {
        let health = Arc::new(HealthRegistry::new());
        health.mark_healthy("cache");
        health.mark_degraded("store", "DATABASE_URL not set");

        let (status, body) = get_health(health_router(health)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "degraded");
        assert_eq!(body["data"]["components"]["cache"]["status"], "healthy");
        assert_eq!(
            body["data"]["components"]["store"]["detail"],
            "DATABASE_URL not set"
        );
    }

    #[tokio::test]
    async fn test_failed_component_turns_health_unavailable() {
        let health = Arc::new(HealthRegistry::new());
        health.mark_healthy("cache");
        health.mark_failed("hook:seed-admin", "permission denied");

        let (status, body) = get_health(health_router(health)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["status"], "failed");
    }

    #[tokio::test]
    async fn test_initialize_requires_health() {
        let registry = RegistryBuilder::new().build().unwrap();
        let mut module = WebServerModule::new("127.0.0.1:0");

        let err = module.initialize(&registry).await.unwrap_err();
        assert!(err.to_string().contains("Web server needs health"));
    }

    #[tokio::test]
    async fn test_start_without_initialize_fails() {
        let mut module = WebServerModule::new("127.0.0.1:0");
        let err = module.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::StartFailed { .. }));
    }

    #[tokio::test]
    async fn test_serves_until_stopped() {
        let health = Arc::new(HealthRegistry::new());
        let mut module = WebServerModule::new("127.0.0.1:0")
            .merge(Router::new().route("/ping", get(|| async { "pong" })));
        let addr = module.local_addr();

        module.initialize(&registry(health)).await.unwrap();
        module.start().await.unwrap();
        let local = addr.borrow().unwrap();

        let mut stream = tokio::net::TcpStream::connect(local).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("pong"));

        module.stop().await.unwrap();
        assert!(addr.borrow().is_none());
        assert!(tokio::net::TcpStream::connect(local).await.is_err());
        module.stop().await.unwrap();
    }
}
