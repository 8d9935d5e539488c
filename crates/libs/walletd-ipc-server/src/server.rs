use std::fs::Permissions;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use walletd_ipc::codec::DEFAULT_MAX_FRAME_LEN;
use walletd_ipc::{resolve_socket_path, IpcError};

use crate::error::ServerError;
use crate::handler::ConnectionHandler;
use crate::liveness::claim_socket_path;
use crate::lock::MutationLock;
use crate::registry::MethodRegistry;

/// How long a handler waits for a frame before re-checking shutdown.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a request waits for the mutation lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_SOCKET_MODE: u32 = 0o600;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Called with every raw request line before the lock is attempted.
pub type RequestObserver = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub poll_interval: Duration,
    pub lock_timeout: Duration,
    /// Mode applied to the socket file after bind; `None` keeps the umask
    /// default.
    pub socket_mode: Option<u32>,
    pub max_frame_len: usize,
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            socket_mode: Some(DEFAULT_SOCKET_MODE),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Defaults at the invoking user's socket path.
    pub fn for_current_user() -> Result<Self, IpcError> {
        Ok(Self::new(resolve_socket_path()?))
    }
}

/// State every connection handler of one server shares.
pub(crate) struct ServerContext {
    pub(crate) registry: Arc<MethodRegistry>,
    pub(crate) lock: MutationLock,
    pub(crate) shutdown: CancellationToken,
    pub(crate) config: ServerConfig,
    pub(crate) observer: Option<RequestObserver>,
}

pub struct Server {
    config: ServerConfig,
    registry: Arc<MethodRegistry>,
    lock: MutationLock,
    observer: Option<RequestObserver>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// `lock` is the daemon's one mutation lock; keep a clone to serialize
    /// wallet access that bypasses the socket.
    pub fn new(config: ServerConfig, registry: Arc<MethodRegistry>, lock: MutationLock) -> Self {
        Self { config, registry, lock, observer: None }
    }

    pub fn with_request_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Claims the socket path, binds and starts accepting.
    ///
    /// Fails with [`ServerError::AlreadyRunning`] when another daemon answers
    /// on the path, in which case nothing on disk is touched. A leftover
    /// socket file nobody listens on is removed first. On any failure after
    /// bind the socket file is removed again.
    pub async fn start(self) -> Result<RunningServer, ServerError> {
        let path = self.config.socket_path.clone();
        claim_socket_path(&path).await?;

        let listener = UnixListener::bind(&path).map_err(|source| {
            if source.kind() == ErrorKind::AddrInUse {
                ServerError::AlreadyRunning { path: path.clone() }
            } else {
                ServerError::Bind { path: path.clone(), source }
            }
        })?;
        let guard = SocketGuard::new(path.clone());

        if let Some(mode) = self.config.socket_mode {
            tokio::fs::set_permissions(&path, Permissions::from_mode(mode))
                .await
                .map_err(|source| ServerError::Permissions { path: path.clone(), source })?;
        }

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let context = Arc::new(ServerContext {
            registry: self.registry,
            lock: self.lock.clone(),
            shutdown: shutdown.clone(),
            config: self.config,
            observer: self.observer,
        });
        let accept_task = tokio::spawn(accept_loop(listener, context, tracker.clone()));

        log::info!("walletd listening socket={}", path.display());
        Ok(RunningServer {
            path,
            lock: self.lock,
            shutdown,
            tracker,
            accept_task: Some(accept_task),
            guard,
        })
    }
}

async fn accept_loop(listener: UnixListener, context: Arc<ServerContext>, tracker: TaskTracker) {
    let mut next_id: u64 = 0;
    loop {
        tokio::select! {
            biased;
            () = context.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    next_id += 1;
                    let handler = ConnectionHandler::new(next_id, stream, Arc::clone(&context));
                    tracker.spawn(handler.run());
                }
                Err(err) => {
                    log::warn!("walletd accept failed err={err}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }
    tracker.close();
    log::debug!("walletd accept loop stopped open_connections={}", tracker.len());
}

/// A bound, accepting server.
///
/// Dropping it raises the shutdown signal and removes the socket file; use
/// [`RunningServer::shutdown`] to also wait for open connections to drain.
pub struct RunningServer {
    path: PathBuf,
    lock: MutationLock,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    accept_task: Option<JoinHandle<()>>,
    guard: SocketGuard,
}

impl std::fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("path", &self.path)
            .field("stopping", &self.is_stopping())
            .field("active_connections", &self.active_connections())
            .finish_non_exhaustive()
    }
}

impl RunningServer {
    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    pub fn lock(&self) -> &MutationLock {
        &self.lock
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn active_connections(&self) -> usize {
        self.tracker.len()
    }

    /// Raises the shutdown signal and unlinks the socket file. Handlers are
    /// not interrupted; each exits at its next poll. Calling it again is a
    /// no-op.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            log::info!("walletd stopping socket={}", self.path.display());
        }
        self.shutdown.cancel();
        self.guard.remove();
    }

    /// Waits for the accept loop and every connection handler to finish.
    /// Returns only after the shutdown signal has been raised.
    pub async fn wait(mut self) {
        if let Some(task) = self.accept_task.take() {
            if let Err(err) = task.await {
                log::error!("walletd accept loop failed err={err}");
            }
        }
        self.tracker.wait().await;
    }

    pub async fn shutdown(self) {
        self.stop();
        self.wait().await;
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Removes the socket file once, on [`SocketGuard::remove`] or drop.
struct SocketGuard {
    path: PathBuf,
    removed: AtomicBool,
}

impl SocketGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, removed: AtomicBool::new(false) }
    }

    fn remove(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                let path = self.path.display();
                log::warn!("walletd failed to remove socket path={path} err={err}");
            }
        }
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        self.remove();
    }
}
