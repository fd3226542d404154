//! HTTP listener.
//!
//! Accepts connections, picks the owning route for each request and hands
//! it to the [`MockDispatcher`].

use crate::config::MockServerConfig;
use crate::dispatcher::MockDispatcher;
use crate::router::RouteTable;
use crate::store::{FixtureStore, FsFixtureStore};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Mock server: route table plus dispatcher.
pub struct MockServer {
    routes: RouteTable,
    dispatcher: MockDispatcher,
    log_unrouted: bool,
}

impl MockServer {
    /// Create a server storing fixtures on the local filesystem.
    pub fn new(config: &MockServerConfig) -> anyhow::Result<Self> {
        Self::with_store(config, Arc::new(FsFixtureStore::new()))
    }

    pub fn with_store(
        config: &MockServerConfig,
        store: Arc<dyn FixtureStore>,
    ) -> anyhow::Result<Self> {
        let routes = RouteTable::new(&config.routes)?;
        let dispatcher = MockDispatcher::new(store, config.settings.clone());

        info!(routes = routes.len(), "Mock server initialized");

        Ok(Self {
            routes,
            dispatcher,
            log_unrouted: config.settings.log_missed,
        })
    }

    pub fn dispatcher(&self) -> &MockDispatcher {
        &self.dispatcher
    }

    /// Serve connections from `listener` until an accept error occurs.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Mock server listening");
        }

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = Arc::clone(&self);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle(req).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(peer = %peer_addr, error = %e, "Connection error");
                }
            });
        }
    }

    /// Answer a single request.
    pub async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        self.respond(req).await
    }

    async fn respond<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Some(route) = self.routes.find(req.uri().path()) else {
            let url = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            if self.log_unrouted {
                warn!(method = %req.method(), url = %url, "No route configured");
            }
            return text_response(
                StatusCode::NOT_FOUND,
                format!("No route configured for {}", url),
            );
        };

        match self.dispatcher.handle_request(req, route).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
