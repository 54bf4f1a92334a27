//! HTTP server implementation.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::parser::{parse_request, request_length, Error as ParserError};
use crate::routing::context::{commit_all, format_context_path, ContextBuilder, ContextHandle, ROOT_CONTEXT_PATH};
use crate::routing::Router;
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::response::{HttpResponse, StatusCode};

/// One request's worth of bytes taken off a connection.
enum Frame {
    Request(Vec<u8>),
    TooLarge,
    Malformed(ParserError),
    Closed,
}

/// An HTTP server.
///
/// Routes are registered through [`ContextHandle`]s until [`HttpServer::init`]
/// (or [`HttpServer::start`], which calls it) freezes them into a [`Router`].
pub struct HttpServer {
    /// The server configuration.
    pub config: ServerConfig,
    contexts: Mutex<BTreeMap<String, Arc<Mutex<ContextBuilder>>>>,
    started: Arc<AtomicBool>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let root = ContextBuilder::root(config.server_name.as_str());
        let mut contexts = BTreeMap::new();
        contexts.insert(ROOT_CONTEXT_PATH.to_string(), Arc::new(Mutex::new(root)));
        Self {
            config,
            contexts: Mutex::new(contexts),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Handle for the context at `path`, created on first use.
    pub fn context(&self, path: &str) -> Result<ContextHandle, Error> {
        let path = format_context_path(path)?;
        let mut contexts = self.contexts.lock();
        if self.is_started() {
            return Err(Error::AlreadyStarted(self.config.server_name.clone()));
        }
        let builder = match contexts.get(&path) {
            Some(builder) => Arc::clone(builder),
            None => {
                let builder = Arc::new(Mutex::new(ContextBuilder::new(self.config.server_name.as_str(), &path)?));
                contexts.insert(path, Arc::clone(&builder));
                builder
            }
        };
        Ok(ContextHandle::new(builder, Arc::clone(&self.started)))
    }

    /// Handle for the root context `/`.
    pub fn root(&self) -> Result<ContextHandle, Error> {
        self.context(ROOT_CONTEXT_PATH)
    }

    /// Mark the server started and commit every context into a [`Router`].
    ///
    /// Later registration calls fail with [`Error::AlreadyStarted`], and so
    /// does a second `init`.
    pub fn init(&self) -> Result<Arc<Router>, Error> {
        let registered = self.contexts.lock();
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted(self.config.server_name.clone()));
        }
        let builders: Vec<ContextBuilder> = registered.values().map(|builder| builder.lock().take()).collect();
        let contexts = commit_all(builders)?;
        let router = Router::new(self.config.server_name.as_str(), self.config.keep_alive, contexts)?;
        info!("Server[{}] initialized", self.config.server_name);
        Ok(Arc::new(router))
    }

    /// Display the server banner and registered endpoints.
    fn display_server_info(&self, router: &Router) {
        let banner = include_str!("../banner.txt");
        info!("\n{banner}");

        info!("Registered endpoints:");
        for (methods, url) in router.endpoints() {
            let methods = methods
                .iter()
                .map(|m| format!("{m}"))
                .collect::<Vec<String>>()
                .join(", ");
            info!("  {methods} {url}");
        }
    }

    /// Set up the TCP listener.
    async fn setup_listener(&self) -> Result<TcpListener, Error> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        info!("Server listening on http://{addr}", addr = self.config.addr);
        Ok(listener)
    }

    /// Set up a Ctrl+C handler for graceful shutdown.
    fn setup_ctrl_c_handler(shutdown_tx: Arc<mpsc::Sender<()>>, tasks: &mut JoinSet<()>) {
        tasks.spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                }
            }
        });
    }

    /// Answer a connection the server has no room for.
    pub async fn reject_connection(socket: &mut (impl AsyncWrite + Unpin)) -> Result<(), Error> {
        let response = HttpResponse::new(StatusCode::ServiceUnavailable)
            .with_content_type("text/plain")
            .with_body_string("Server is at capacity, please try again later");
        socket.write_all(&response.to_bytes()).await?;
        Ok(())
    }

    /// Handle a new connection.
    fn handle_new_connection(
        mut socket: tokio::net::TcpStream,
        addr: SocketAddr,
        semaphore: Arc<Semaphore>,
        router: Arc<Router>,
        config: Arc<ServerConfig>,
        tasks: &mut JoinSet<()>,
    ) {
        let permit = match semaphore.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting connection from {addr}");
                tasks.spawn(async move {
                    let _ = Self::reject_connection(&mut socket).await;
                });
                return;
            }
        };

        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            if let Err(e) = Self::handle_connection(&mut socket, router, &config, Some(addr)).await {
                error!("Error handling connection from {addr}: {e}");
            }
        });
    }

    /// Handle connection errors.
    async fn handle_connection_error(e: std::io::Error) -> bool {
        error!("Error accepting connection: {e}");

        if e.kind() == std::io::ErrorKind::BrokenPipe {
            error!("Critical error accepting connection, shutting down");
            return true;
        }

        // For other errors, wait a bit before retrying
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        false
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(tasks: &mut JoinSet<()>) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let _ = tokio::time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await;

        info!("Server shutdown complete");
    }

    /// Initialize the router, then accept connections until Ctrl+C.
    pub async fn start(&self) -> Result<(), Error> {
        self.config.validate()?;
        let router = self.init()?;
        self.display_server_info(&router);

        let listener = self.setup_listener().await?;
        let config = Arc::new(self.config.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let shutdown_tx = Arc::new(shutdown_tx);

        // Use JoinSet to keep track of all spawned tasks
        let mut tasks = JoinSet::new();
        Self::setup_ctrl_c_handler(shutdown_tx, &mut tasks);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server...");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            Self::handle_new_connection(
                                socket,
                                addr,
                                Arc::clone(&semaphore),
                                Arc::clone(&router),
                                Arc::clone(&config),
                                &mut tasks,
                            );
                        },
                        Err(e) => {
                            if Self::handle_connection_error(e).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Self::perform_shutdown(&mut tasks).await;

        Ok(())
    }

    /// Read bytes until `buffer` starts with one complete request.
    async fn read_frame(
        socket: &mut (impl AsyncRead + Unpin),
        buffer: &mut Vec<u8>,
        config: &ServerConfig,
    ) -> Result<Frame, Error> {
        let mut chunk = vec![0; config.read_buffer_size];
        loop {
            match request_length(buffer) {
                Ok(Some(length)) if length > config.max_request_size => return Ok(Frame::TooLarge),
                Ok(Some(length)) => return Ok(Frame::Request(buffer.drain(..length).collect())),
                Ok(None) if buffer.len() > config.max_request_size => return Ok(Frame::TooLarge),
                Ok(None) => {}
                Err(e) => return Ok(Frame::Malformed(e)),
            }

            let n = socket.read(&mut chunk).await?;
            if n == 0 {
                if buffer.is_empty() {
                    return Ok(Frame::Closed);
                }
                // the peer hung up half way through a request
                let error = parse_request(buffer).err().unwrap_or(ParserError::Incomplete);
                return Ok(Frame::Malformed(error));
            }
            buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Serve requests on one connection until it closes, or after the first
    /// request unless both sides keep the connection alive.
    pub async fn handle_connection(
        socket: &mut (impl AsyncRead + AsyncWrite + Unpin),
        router: Arc<Router>,
        config: &ServerConfig,
        peer: Option<SocketAddr>,
    ) -> Result<(), Error> {
        let mut buffer = Vec::new();
        loop {
            let bytes = match Self::read_frame(socket, &mut buffer, config).await? {
                Frame::Request(bytes) => bytes,
                Frame::Closed => return Ok(()),
                Frame::TooLarge => {
                    let response = HttpResponse::new(StatusCode::PayloadTooLarge)
                        .with_content_type("text/plain")
                        .with_body_string(format!(
                            "Request exceeds the maximum size of {} bytes",
                            config.max_request_size
                        ));
                    socket.write_all(&response.to_bytes()).await?;
                    return Ok(());
                }
                Frame::Malformed(e) => {
                    let response = HttpResponse::new(StatusCode::BadRequest)
                        .with_content_type("text/plain")
                        .with_body_string(format!("Error parsing request: {e}"));
                    socket.write_all(&response.to_bytes()).await?;
                    return Err(Error::ParseError(e));
                }
            };

            let request = match parse_request(&bytes) {
                Ok(req) => req,
                Err(e) => {
                    let response = HttpResponse::new(StatusCode::BadRequest)
                        .with_content_type("text/plain")
                        .with_body_string(format!("Error parsing request: {e}"));
                    socket.write_all(&response.to_bytes()).await?;
                    return Err(Error::ParseError(e));
                }
            };

            let keep_alive = config.keep_alive && request.wants_keep_alive();
            debug!("{} {} from {:?}", request.method, request.path, peer);

            let response = match router.dispatch(request, peer) {
                Ok(response) => response,
                Err(e) => {
                    socket
                        .write_all(&HttpResponse::new(StatusCode::InternalServerError).to_bytes())
                        .await?;
                    return Err(e);
                }
            };
            socket.write_all(&response.to_bytes()).await?;

            if !keep_alive {
                return Ok(());
            }
        }
    }
}
