use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use relay_core::LatestState;
use tokio::sync::oneshot;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientRegistry};
use crate::handlers;
use crate::notifier::FanoutNotifier;

/// HTTP server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub public_dir: PathBuf,
    pub max_send_queue: usize,
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            public_dir: PathBuf::from("public"),
            max_send_queue: 256,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Shared application state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub latest: Arc<LatestState>,
    pub registry: Arc<ClientRegistry>,
}

impl AppState {
    pub fn new(latest: Arc<LatestState>, max_send_queue: usize) -> Self {
        Self {
            latest,
            registry: Arc::new(ClientRegistry::new(max_send_queue)),
        }
    }

    /// Notifier broadcasting to this state's clients.
    pub fn notifier(&self) -> FanoutNotifier {
        FanoutNotifier::new(Arc::clone(&self.registry))
    }
}

/// Application routes without middleware.
pub fn routes(state: AppState, public_dir: &Path) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/latest", get(handlers::latest))
        .route("/latest-view", get(handlers::latest_view))
        .route("/health", get(handlers::health))
        .route("/ws", get(ws_handler))
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
}

/// Panics become 500 responses instead of taking the process down.
pub fn with_middleware(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Build the axum router with all routes and middleware.
pub fn build_router(state: AppState, public_dir: &Path) -> Router {
    with_middleware(routes(state, public_dir))
}

/// Bind and serve. Returns once the listener is bound.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let cleanup = client::start_cleanup_task(Arc::clone(&state.registry), config.cleanup_interval);

    let router = build_router(state, &config.public_dir);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        port = local_addr.port(),
        public_dir = %config.public_dir.display(),
        "HTTP server listening"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown: shutdown_tx,
        server,
        cleanup,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    shutdown: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        self.cleanup.abort();
        let _ = self.server.await;
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.registry.register();
    tracing::info!(
        client_id = %client_id,
        clients = state.registry.count(),
        "push client connected"
    );

    client::handle_ws_connection(socket, client_id, rx, state.registry).await;
}
