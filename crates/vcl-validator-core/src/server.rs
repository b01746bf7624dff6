//! Native HTTP server implementation
//!
//! hyper HTTP/1.1 server with:
//! - Bodies collected up front, bounded by size and read time
//! - Middleware chain around an exact-path router
//! - Connection tracking and graceful shutdown that drains in-flight requests
//! - TCP_NODELAY for low latency

use crate::router::RouteMatch;
use crate::{BodyError, Method, Middleware, MiddlewareChain, Request, Response, Result, Router};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::Instrument;

// Default values
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BODY_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_HEADER_SIZE: usize = 1024 * 1024; // 1MB
const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_SHUTDOWN_DELAY: Duration = Duration::from_secs(3);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub listen: SocketAddr,
    /// Runtime worker threads
    pub workers: usize,
    /// Time allowed for a client to send the request head
    pub header_read_timeout: Duration,
    /// Time allowed for a client to send the request body
    pub body_read_timeout: Duration,
    /// Read buffer cap, which bounds the request head size
    pub max_header_size: usize,
    /// Largest accepted request body
    pub max_body_size: usize,
    /// Grace period between the shutdown signal and closing the listener
    pub shutdown_delay: Duration,
    /// Upper bound on waiting for connections to drain (None = wait forever)
    pub drain_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            workers: num_cpus::get(),
            header_read_timeout: DEFAULT_HEADER_READ_TIMEOUT,
            body_read_timeout: DEFAULT_BODY_READ_TIMEOUT,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            shutdown_delay: DEFAULT_SHUTDOWN_DELAY,
            drain_timeout: None,
        }
    }
}

/// Dynamic route handler type
pub type DynamicHandler = Arc<
    dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async function as a `DynamicHandler`
pub fn handler_fn<F, Fut>(f: F) -> DynamicHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req: Request| -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(f(req))
    })
}

/// Server state shared across all connections
///
/// Built once before serving; routes and middleware are immutable afterwards.
pub struct ServerState {
    router: Router<DynamicHandler>,
    middleware: MiddlewareChain,
    config: ServerConfig,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            router: Router::new(),
            middleware: MiddlewareChain::new(),
            config,
        }
    }

    /// Append a middleware to the chain
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// Register a route
    pub fn route(mut self, method: Method, path: &str, handler: DynamicHandler) -> Result<Self> {
        self.router.route(method, path, handler)?;
        Ok(self)
    }

    /// Run middleware and the matching handler
    pub async fn handle(&self, mut req: Request) -> Response {
        let mut res = match self.middleware.run_before(&mut req) {
            Some(res) => res,
            None => match self.router.match_route(&req.method, &req.path) {
                RouteMatch::Found(handler) => handler(req.clone()).await,
                RouteMatch::MethodNotAllowed(allowed) => Response::method_not_allowed(&allowed),
                RouteMatch::NotFound => Response::not_found(),
            },
        };

        self.middleware.run_after(&req, &mut res);
        res
    }

    /// Convert a hyper request, collect its body and handle it
    pub async fn dispatch(&self, req: hyper::Request<Incoming>, remote_addr: SocketAddr) -> Response {
        let (parts, body) = req.into_parts();

        let mut request = from_hyper_parts(&parts);
        request.remote_addr = Some(remote_addr);

        if !request.method.is_bodyless() {
            match self.collect_body(body, request.content_length()).await {
                Ok(bytes) => request.body = bytes,
                Err(e) => {
                    tracing::debug!(error = %e, peer = %remote_addr, "request body unavailable");
                    request.body_error = Some(e);
                }
            }
        }

        self.handle(request).await
    }

    async fn collect_body(&self, body: Incoming, declared: Option<usize>) -> std::result::Result<Bytes, BodyError> {
        let limit = self.config.max_body_size;

        // Don't read what we are going to refuse anyway
        if declared.is_some_and(|len| len > limit) {
            return Err(BodyError::TooLarge { limit });
        }

        let collected = tokio::time::timeout(
            self.config.body_read_timeout,
            Limited::new(body, limit).collect(),
        )
        .await;

        match collected {
            Ok(Ok(collected)) => Ok(collected.to_bytes()),
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(BodyError::TooLarge { limit })
            }
            Ok(Err(e)) => Err(BodyError::Read(e.to_string())),
            Err(_) => Err(BodyError::Read(format!(
                "timed out after {}s",
                self.config.body_read_timeout.as_secs()
            ))),
        }
    }
}

/// HTTP server bound to a `ServerState`
pub struct Server {
    state: Arc<ServerState>,
    tracker: Arc<ConnectionTracker>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Server {
    pub fn new(state: ServerState) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
            tracker: Arc::new(ConnectionTracker::new()),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Bind the configured listen address
    pub fn bind(&self) -> Result<TcpListener> {
        let socket = create_optimized_socket(&self.state.config.listen)?;
        socket.set_nonblocking(true)?;
        let listener = TcpListener::from_std(socket.into())?;
        Ok(listener)
    }

    /// Handle that stops `serve` from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tracker: self.tracker.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    /// Number of connections currently open
    pub fn active_connections(&self) -> u64 {
        self.tracker.count()
    }

    /// Accept connections until shutdown is triggered
    ///
    /// Returns once the listener is closed. Open connections keep running:
    /// each finishes its in-flight request and then closes. Use `drain` to
    /// wait for them.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            // Usually fd exhaustion; back off instead of spinning
                            tracing::warn!(error = %e, "accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    // Reject new connections during shutdown
                    if self.tracker.is_shutting_down() {
                        drop(stream);
                        continue;
                    }

                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "unable to set TCP_NODELAY");
                    }

                    self.spawn_connection(stream, remote_addr, shutdown_rx.clone());
                }
                _ = shutdown_rx.changed() => {
                    self.tracker.start_shutdown();
                    break;
                }
            }
        }

        tracing::info!(active = self.tracker.count(), "listener closed");
        Ok(())
    }

    /// Wait for open connections to finish (see `ConnectionTracker::wait_idle`)
    pub async fn drain(&self, timeout: Option<Duration>) -> bool {
        self.tracker.wait_idle(timeout).await
    }

    fn spawn_connection(&self, stream: TcpStream, remote_addr: SocketAddr, mut shutdown_rx: watch::Receiver<bool>) {
        let state = self.state.clone();
        let tracker = self.tracker.clone();
        tracker.increment();

        tokio::spawn(
            async move {
                let io = TokioIo::new(stream);
                let service_state = state.clone();
                let service = service_fn(move |req| {
                    let state = service_state.clone();
                    async move {
                        let res = state.dispatch(req, remote_addr).await;
                        Ok::<_, Infallible>(to_hyper_response(res))
                    }
                });

                let mut builder = http1::Builder::new();
                builder
                    .timer(TokioTimer::new())
                    .header_read_timeout(state.config.header_read_timeout)
                    .max_buf_size(state.config.max_header_size);

                let conn = builder.serve_connection(io, service);
                tokio::pin!(conn);

                let mut draining = false;
                let result = loop {
                    tokio::select! {
                        result = conn.as_mut() => break result,
                        _ = shutdown_rx.changed(), if !draining => {
                            // Finish the in-flight request, then close
                            draining = true;
                            conn.as_mut().graceful_shutdown();
                        }
                    }
                };

                if let Err(e) = result {
                    tracing::debug!(error = %e, peer = %remote_addr, "connection error");
                }

                tracker.decrement();
            }
            .in_current_span(),
        );
    }
}

/// Triggers shutdown of a running `Server`
#[derive(Clone)]
pub struct ShutdownHandle {
    tracker: Arc<ConnectionTracker>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Stop accepting and ask open connections to close after their current request
    pub fn trigger(&self) {
        self.tracker.start_shutdown();
        self.shutdown_tx.send_replace(true);
    }
}

/// Create a TCP listening socket with optimizations
fn create_optimized_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // TCP_NODELAY - disable Nagle's algorithm for lower latency
    socket.set_nodelay(true)?;

    // Bind
    socket.bind(&(*addr).into())?;

    // Listen with backlog
    socket.listen(1024)?;

    Ok(socket)
}

/// Convert hyper request parts to our Request type (body is filled in later)
fn from_hyper_parts(parts: &http::request::Parts) -> Request {
    let uri = &parts.uri;
    let mut request = Request::new(Method::parse(parts.method.as_str()), uri.path());
    request.query = uri.query().map(|s| s.to_string());

    // Copy headers
    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            request.headers.push((name.to_string(), v.to_string()));
        }
    }

    request
}

/// Convert our Response to hyper Response
fn to_hyper_response(res: Response) -> hyper::Response<Full<Bytes>> {
    let mut builder = hyper::Response::builder().status(res.status.as_u16());

    for (name, value) in &res.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Full::new(res.body)) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, status = res.status.as_u16(), "invalid response");
            let mut response = hyper::Response::new(Full::new(Bytes::from_static(b"internal server error\n")));
            *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

// ============================================================================
// Connection Tracking for Graceful Shutdown
// ============================================================================

/// Tracks active connections for graceful shutdown
///
/// Used to:
/// - Count active connections
/// - Signal shutdown to reject new connections
/// - Wait for existing connections to drain
#[derive(Debug)]
pub struct ConnectionTracker {
    /// Active connection count
    active: AtomicU64,
    /// Shutdown signal received
    shutting_down: AtomicBool,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    /// Create a new connection tracker
    pub fn new() -> Self {
        Self {
            active: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Increment active connection count
    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement active connection count
    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Get current active connection count
    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Signal that shutdown is in progress
    pub fn start_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Check if shutdown is in progress
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait until no connections are open
    ///
    /// Returns true if all connections drained, false if the timeout was
    /// reached first. `None` waits forever.
    pub async fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let start = Instant::now();

        loop {
            if self.count() == 0 {
                return true;
            }

            if let Some(t) = timeout {
                if start.elapsed() >= t {
                    return false;
                }
            }

            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}
