use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use crate::codec::{self, FramedStream, DEFAULT_MAX_FRAME_LEN};
use crate::error::IpcError;
use crate::socket::resolve_socket_path;
use crate::types::{Params, Request, RequestId, Response};
use crate::wallet::{methods, AccountInfo, AddressBalance, SendRequest, TxRecord, WalletApi};

/// Client proxy for a running daemon.
///
/// One proxy holds one connection; calls made through a shared proxy are
/// sent one at a time so each response pairs with its request.
pub struct WalletClient {
    path: PathBuf,
    connection: Mutex<FramedStream>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for WalletClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletClient").field("path", &self.path).finish_non_exhaustive()
    }
}

impl WalletClient {
    /// Fails with [`IpcError::DaemonNotRunning`] when the socket file is
    /// missing, refuses the connection, or is not accessible.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path).await.map_err(|err| connect_error(&path, err))?;
        log::debug!("walletd client connected socket={}", path.display());
        Ok(Self {
            path,
            connection: Mutex::new(codec::framed(stream, DEFAULT_MAX_FRAME_LEN)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Connects to the invoking user's daemon.
    pub async fn connect_default() -> Result<Self, IpcError> {
        Self::connect(resolve_socket_path()?).await
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Sends `method` and, when `wants_response` is set, waits for its
    /// result. A notification returns `Ok(None)` as soon as the frame is
    /// written.
    pub async fn invoke(
        &self,
        method: &str,
        params: Params,
        wants_response: bool,
    ) -> Result<Option<JsonValue>, IpcError> {
        if wants_response {
            self.call(method, params).await.map(Some)
        } else {
            self.notify(method, params).await.map(|()| None)
        }
    }

    pub async fn call(&self, method: &str, params: Params) -> Result<JsonValue, IpcError> {
        let id = RequestId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = Request::call(id.clone(), method, params);

        let mut connection = self.connection.lock().await;
        self.send(&mut connection, &request).await?;
        loop {
            let response = self.receive(&mut connection).await?;
            // Left over from a call whose future was dropped mid-flight.
            if matches!(&response.id, Some(response_id) if *response_id != id) {
                log::warn!("walletd client discarding stale response id={:?}", response.id);
                continue;
            }
            return response.into_result().map_err(IpcError::from);
        }
    }

    pub async fn notify(&self, method: &str, params: Params) -> Result<(), IpcError> {
        let request = Request::notify(method, params);
        let mut connection = self.connection.lock().await;
        self.send(&mut connection, &request).await
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Params,
    ) -> Result<T, IpcError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|err| IpcError::protocol(format!("unexpected result for {method}: {err}")))
    }

    async fn send(&self, connection: &mut FramedStream, request: &Request) -> Result<(), IpcError> {
        let line = codec::encode_line(request)?;
        connection.send(line).await.map_err(|err| {
            log::debug!(
                "walletd client send failed socket={} err={}",
                self.path.display(),
                codec::into_io_error(err)
            );
            self.not_running()
        })
    }

    async fn receive(&self, connection: &mut FramedStream) -> Result<Response, IpcError> {
        match connection.next().await {
            Some(Ok(line)) => codec::decode_frame(line.as_bytes())
                .map_err(|err| IpcError::protocol(format!("malformed response frame: {err}"))),
            Some(Err(err)) => Err(IpcError::Io(codec::into_io_error(err))),
            None => Err(self.not_running()),
        }
    }

    fn not_running(&self) -> IpcError {
        IpcError::DaemonNotRunning { path: self.path.clone() }
    }
}

fn account_params(account: Option<&str>) -> Params {
    Params::new().kwarg("account", json!(account))
}

fn connect_error(path: &Path, err: io::Error) -> IpcError {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::PermissionDenied => {
            IpcError::DaemonNotRunning { path: path.to_path_buf() }
        }
        _ => IpcError::Io(err),
    }
}

#[async_trait]
impl WalletApi for WalletClient {
    async fn confirmed_balance(&self, account: Option<&str>) -> Result<u64, IpcError> {
        self.call_typed(methods::CONFIRMED_BALANCE, account_params(account)).await
    }

    async fn unconfirmed_balance(&self, account: Option<&str>) -> Result<u64, IpcError> {
        self.call_typed(methods::UNCONFIRMED_BALANCE, account_params(account)).await
    }

    async fn payout_address(&self, account: Option<&str>) -> Result<String, IpcError> {
        self.call_typed(methods::PAYOUT_ADDRESS, account_params(account)).await
    }

    async fn account_names(&self) -> Result<Vec<String>, IpcError> {
        self.call_typed(methods::ACCOUNT_NAMES, Params::new()).await
    }

    async fn list_accounts(&self) -> Result<Vec<AccountInfo>, IpcError> {
        self.call_typed(methods::LIST_ACCOUNTS, Params::new()).await
    }

    async fn addresses(
        &self,
        accounts: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, IpcError> {
        self.call_typed(methods::ADDRESSES, Params::new().kwarg("accounts", json!(accounts))).await
    }

    async fn balances_by_address(
        &self,
        account: Option<&str>,
    ) -> Result<BTreeMap<String, AddressBalance>, IpcError> {
        self.call_typed(methods::BALANCES_BY_ADDRESS, account_params(account)).await
    }

    async fn send_to(&self, request: SendRequest) -> Result<Vec<TxRecord>, IpcError> {
        let params = Params::new()
            .kwarg("address", json!(request.address))
            .kwarg("amount", json!(request.amount))
            .kwarg("use_unconfirmed", json!(request.use_unconfirmed))
            .kwarg("fees", json!(request.fees))
            .kwarg("accounts", json!(request.accounts));
        self.call_typed(methods::SEND_TO, params).await
    }

    async fn spread_utxos(
        &self,
        threshold: u64,
        num_addresses: u32,
        accounts: &[String],
    ) -> Result<Vec<TxRecord>, IpcError> {
        let params = Params::new()
            .kwarg("threshold", json!(threshold))
            .kwarg("num_addresses", json!(num_addresses))
            .kwarg("accounts", json!(accounts));
        self.call_typed(methods::SPREAD_UTXOS, params).await
    }

    async fn create_account(&self, name: &str) -> Result<bool, IpcError> {
        self.call_typed(methods::CREATE_ACCOUNT, Params::new().kwarg("name", json!(name))).await
    }

    async fn sweep(&self, address: &str, accounts: &[String]) -> Result<Vec<String>, IpcError> {
        let params =
            Params::new().kwarg("address", json!(address)).kwarg("accounts", json!(accounts));
        self.call_typed(methods::SWEEP, params).await
    }

    async fn sign_bitcoin_message(&self, message: &str, address: &str) -> Result<String, IpcError> {
        let params =
            Params::new().kwarg("message", json!(message)).kwarg("address", json!(address));
        self.call_typed(methods::SIGN_BITCOIN_MESSAGE, params).await
    }

    async fn verify_bitcoin_message(
        &self,
        message: &str,
        signature: &str,
        address: &str,
    ) -> Result<bool, IpcError> {
        let params = Params::new()
            .kwarg("message", json!(message))
            .kwarg("signature", json!(signature))
            .kwarg("address", json!(address));
        self.call_typed(methods::VERIFY_BITCOIN_MESSAGE, params).await
    }

    async fn sync_wallet_file(&self) -> Result<(), IpcError> {
        self.notify(methods::SYNC_WALLET_FILE, Params::new()).await
    }
}
