use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IpcError;

/// Wire names of every operation the daemon serves.
///
/// Keyword argument names follow the wallet's own parameter names
/// (`account`, `accounts`, `address`, ...).
pub mod methods {
    pub const CONFIRMED_BALANCE: &str = "confirmedBalance";
    pub const UNCONFIRMED_BALANCE: &str = "unconfirmedBalance";
    pub const PAYOUT_ADDRESS: &str = "payoutAddress";
    pub const ACCOUNT_NAMES: &str = "accountNames";
    pub const LIST_ACCOUNTS: &str = "listAccounts";
    pub const ADDRESSES: &str = "addresses";
    pub const BALANCES_BY_ADDRESS: &str = "balancesByAddress";
    pub const SEND_TO: &str = "sendTo";
    pub const SPREAD_UTXOS: &str = "spreadUtxos";
    pub const CREATE_ACCOUNT: &str = "createAccount";
    pub const SWEEP: &str = "sweep";
    pub const SIGN_BITCOIN_MESSAGE: &str = "signBitcoinMessage";
    pub const VERIFY_BITCOIN_MESSAGE: &str = "verifyBitcoinMessage";
    pub const SYNC_WALLET_FILE: &str = "syncWalletFile";

    pub const ALL: [&str; 14] = [
        CONFIRMED_BALANCE,
        UNCONFIRMED_BALANCE,
        PAYOUT_ADDRESS,
        ACCOUNT_NAMES,
        LIST_ACCOUNTS,
        ADDRESSES,
        BALANCES_BY_ADDRESS,
        SEND_TO,
        SPREAD_UTXOS,
        CREATE_ACCOUNT,
        SWEEP,
        SIGN_BITCOIN_MESSAGE,
        VERIFY_BITCOIN_MESSAGE,
        SYNC_WALLET_FILE,
    ];
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub name: String,
    pub index: u32,
}

/// Per-address balances in satoshis. `total` includes unconfirmed funds.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressBalance {
    pub confirmed: u64,
    pub total: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxRecord {
    pub txid: String,
    pub amount: u64,
    pub fee: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendRequest {
    pub address: String,
    /// Satoshis.
    pub amount: u64,
    #[serde(default)]
    pub use_unconfirmed: bool,
    /// Explicit fee in satoshis; the wallet picks one when absent.
    #[serde(default)]
    pub fees: Option<u64>,
    /// Accounts to spend from; empty means all of them.
    #[serde(default)]
    pub accounts: Vec<String>,
}

impl SendRequest {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self { address: address.into(), amount, ..Self::default() }
    }
}

/// Every operation reachable through the daemon.
///
/// The daemon registers an implementation of this trait as its method
/// registry; [`crate::WalletClient`] implements it by forwarding each call
/// over the socket, so CLI code is written once against the trait.
/// `account: None` means "all accounts" for balance queries and "the default
/// account" for address queries.
#[async_trait]
pub trait WalletApi: Send + Sync {
    /// Confirmed balance in satoshis.
    async fn confirmed_balance(&self, account: Option<&str>) -> Result<u64, IpcError>;

    /// Total balance in satoshis, including unconfirmed transactions.
    async fn unconfirmed_balance(&self, account: Option<&str>) -> Result<u64, IpcError>;

    /// Next unused receive address.
    async fn payout_address(&self, account: Option<&str>) -> Result<String, IpcError>;

    async fn account_names(&self) -> Result<Vec<String>, IpcError>;

    /// Accounts ordered by index.
    async fn list_accounts(&self) -> Result<Vec<AccountInfo>, IpcError>;

    /// Addresses grouped by account name; empty `accounts` selects all.
    async fn addresses(
        &self,
        accounts: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, IpcError>;

    async fn balances_by_address(
        &self,
        account: Option<&str>,
    ) -> Result<BTreeMap<String, AddressBalance>, IpcError>;

    async fn send_to(&self, request: SendRequest) -> Result<Vec<TxRecord>, IpcError>;

    /// Splits every balance above `threshold` across `num_addresses` fresh
    /// change addresses.
    async fn spread_utxos(
        &self,
        threshold: u64,
        num_addresses: u32,
        accounts: &[String],
    ) -> Result<Vec<TxRecord>, IpcError>;

    /// Returns `false` when an account with that name already exists.
    async fn create_account(&self, name: &str) -> Result<bool, IpcError>;

    /// Moves every spendable satoshi to `address`. Returns the txids.
    async fn sweep(&self, address: &str, accounts: &[String]) -> Result<Vec<String>, IpcError>;

    async fn sign_bitcoin_message(&self, message: &str, address: &str) -> Result<String, IpcError>;

    async fn verify_bitcoin_message(
        &self,
        message: &str,
        signature: &str,
        address: &str,
    ) -> Result<bool, IpcError>;

    /// Persists in-memory state. Clients usually send this as a notification.
    async fn sync_wallet_file(&self) -> Result<(), IpcError>;
}
