//! In-memory development wallet.
//!
//! Balances live per address; addresses, txids and message signatures are
//! derived with SHA-256 from a seed so runs are reproducible. Nothing is
//! broadcast and nothing touches disk.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use walletd_ipc::{AccountInfo, AddressBalance, IpcError, SendRequest, TxRecord, WalletApi};

use crate::config::AccountConfig;

pub const DEFAULT_ACCOUNT: &str = "default";
pub const DEFAULT_SEED: &str = "walletd-dev";

/// Fee charged when a send does not name one, in satoshis.
pub const DEFAULT_FEE: u64 = 10_000;

pub const MIN_SPREAD_ADDRESSES: u32 = 2;
pub const MAX_SPREAD_ADDRESSES: u32 = 100;

#[derive(Clone, Copy, Debug, Default)]
struct Funds {
    confirmed: u64,
    unconfirmed: u64,
}

impl Funds {
    fn total(&self) -> u64 {
        self.confirmed.saturating_add(self.unconfirmed)
    }
}

/// Balances come from config unchecked, so sums clamp instead of overflowing.
fn saturating_sum(amounts: impl IntoIterator<Item = u64>) -> u64 {
    amounts.into_iter().fold(0, u64::saturating_add)
}

#[derive(Debug)]
struct Account {
    name: String,
    index: u32,
    next_receive: u32,
    /// Funded addresses in derivation order.
    addresses: Vec<(String, Funds)>,
}

impl Account {
    fn confirmed(&self) -> u64 {
        saturating_sum(self.addresses.iter().map(|(_, funds)| funds.confirmed))
    }

    fn total(&self) -> u64 {
        saturating_sum(self.addresses.iter().map(|(_, funds)| funds.total()))
    }

    fn spendable(&self, use_unconfirmed: bool) -> u64 {
        if use_unconfirmed {
            self.total()
        } else {
            self.confirmed()
        }
    }

    /// Takes `amount` from the addresses in order, confirmed funds first.
    fn debit(&mut self, mut amount: u64, use_unconfirmed: bool) {
        for (_, funds) in &mut self.addresses {
            let taken = amount.min(funds.confirmed);
            funds.confirmed -= taken;
            amount -= taken;
            if use_unconfirmed {
                let taken = amount.min(funds.unconfirmed);
                funds.unconfirmed -= taken;
                amount -= taken;
            }
            if amount == 0 {
                break;
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<Account>,
    tx_count: u64,
}

impl State {
    fn account(&self, name: &str) -> Result<&Account, IpcError> {
        self.accounts
            .iter()
            .find(|account| account.name == name)
            .ok_or_else(|| unknown_account(name))
    }

    fn account_mut(&mut self, name: &str) -> Result<&mut Account, IpcError> {
        self.accounts
            .iter_mut()
            .find(|account| account.name == name)
            .ok_or_else(|| unknown_account(name))
    }

    /// Indices of the named accounts; empty `names` selects every account.
    fn select(&self, names: &[String]) -> Result<Vec<usize>, IpcError> {
        if names.is_empty() {
            return Ok((0..self.accounts.len()).collect());
        }
        names
            .iter()
            .map(|name| {
                self.accounts
                    .iter()
                    .position(|account| &account.name == name)
                    .ok_or_else(|| unknown_account(name))
            })
            .collect()
    }

    fn select_one(&self, account: Option<&str>) -> Result<Vec<usize>, IpcError> {
        match account {
            None => self.select(&[]),
            Some(name) => self.select(&[name.to_owned()]),
        }
    }

    fn owns(&self, address: &str) -> bool {
        self.accounts
            .iter()
            .any(|account| account.addresses.iter().any(|(owned, _)| owned == address))
    }
}

fn unknown_account(name: &str) -> IpcError {
    IpcError::wallet(format!("Account '{name}' does not exist"))
}

#[derive(Debug)]
pub struct MemoryWallet {
    key: [u8; 32],
    state: Mutex<State>,
    syncs: AtomicU64,
}

impl MemoryWallet {
    /// A wallet holding only the empty default account.
    pub fn new(seed: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
        let default = Account {
            name: DEFAULT_ACCOUNT.to_owned(),
            index: 0,
            next_receive: 0,
            addresses: Vec::new(),
        };
        let state = State { accounts: vec![default], tx_count: 0 };
        Self { key, state: Mutex::new(state), syncs: AtomicU64::new(0) }
    }

    /// Creates every configured account and credits its opening balance to
    /// its first receive address.
    pub fn from_config(seed: &str, accounts: &[AccountConfig]) -> Result<Self, IpcError> {
        let wallet = Self::new(seed);
        for account in accounts {
            {
                let mut state = wallet.state()?;
                if state.account(&account.name).is_err() {
                    wallet.insert_account(&mut state, &account.name);
                }
            }
            if account.confirmed > 0 || account.unconfirmed > 0 {
                wallet.fund(&account.name, account.confirmed, account.unconfirmed)?;
            }
        }
        Ok(wallet)
    }

    /// Credits a fresh receive address of `account`; returns that address.
    pub fn fund(
        &self,
        account: &str,
        confirmed: u64,
        unconfirmed: u64,
    ) -> Result<String, IpcError> {
        let mut state = self.state()?;
        let account = state.account_mut(account)?;
        let address = self.address(account.index, account.next_receive);
        account.next_receive += 1;
        account.addresses.push((address.clone(), Funds { confirmed, unconfirmed }));
        log::debug!("memory wallet funded account={} address={address}", account.name);
        Ok(address)
    }

    /// Number of completed `sync_wallet_file` calls.
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::SeqCst)
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, IpcError> {
        self.state.lock().map_err(|_| IpcError::wallet("wallet state is unavailable"))
    }

    fn insert_account(&self, state: &mut State, name: &str) {
        let index = state.accounts.iter().map(|account| account.index + 1).max().unwrap_or(0);
        state.accounts.push(Account {
            name: name.to_owned(),
            index,
            next_receive: 0,
            addresses: Vec::new(),
        });
    }

    fn digest(&self, domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(domain);
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }

    fn address(&self, account: u32, index: u32) -> String {
        let digest = self.digest(b"address", &[&account.to_be_bytes(), &index.to_be_bytes()]);
        format!("1{}", &hex::encode(digest)[..33])
    }

    fn next_txid(&self, state: &mut State) -> String {
        state.tx_count += 1;
        hex::encode(self.digest(b"tx", &[&state.tx_count.to_be_bytes()]))
    }

    fn signature(&self, message: &str, address: &str) -> String {
        hex::encode(self.digest(b"message", &[address.as_bytes(), b"\0", message.as_bytes()]))
    }
}

#[async_trait]
impl WalletApi for MemoryWallet {
    async fn confirmed_balance(&self, account: Option<&str>) -> Result<u64, IpcError> {
        let state = self.state()?;
        let selected = state.select_one(account)?;
        Ok(saturating_sum(selected.into_iter().map(|i| state.accounts[i].confirmed())))
    }

    async fn unconfirmed_balance(&self, account: Option<&str>) -> Result<u64, IpcError> {
        let state = self.state()?;
        let selected = state.select_one(account)?;
        Ok(saturating_sum(selected.into_iter().map(|i| state.accounts[i].total())))
    }

    async fn payout_address(&self, account: Option<&str>) -> Result<String, IpcError> {
        let state = self.state()?;
        let account = state.account(account.unwrap_or(DEFAULT_ACCOUNT))?;
        Ok(self.address(account.index, account.next_receive))
    }

    async fn account_names(&self) -> Result<Vec<String>, IpcError> {
        let state = self.state()?;
        Ok(state.accounts.iter().map(|account| account.name.clone()).collect())
    }

    async fn list_accounts(&self) -> Result<Vec<AccountInfo>, IpcError> {
        let state = self.state()?;
        let mut accounts: Vec<AccountInfo> = state
            .accounts
            .iter()
            .map(|account| AccountInfo { name: account.name.clone(), index: account.index })
            .collect();
        accounts.sort_by_key(|account| account.index);
        Ok(accounts)
    }

    async fn addresses(
        &self,
        accounts: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, IpcError> {
        let state = self.state()?;
        let selected = state.select(accounts)?;
        Ok(selected
            .into_iter()
            .map(|i| {
                let account = &state.accounts[i];
                let addresses: Vec<String> =
                    account.addresses.iter().map(|(address, _)| address.clone()).collect();
                (account.name.clone(), addresses)
            })
            .collect())
    }

    async fn balances_by_address(
        &self,
        account: Option<&str>,
    ) -> Result<BTreeMap<String, AddressBalance>, IpcError> {
        let state = self.state()?;
        let mut balances = BTreeMap::new();
        for i in state.select_one(account)? {
            for (address, funds) in &state.accounts[i].addresses {
                let balance = AddressBalance {
                    confirmed: funds.confirmed,
                    total: funds.total(),
                };
                balances.insert(address.clone(), balance);
            }
        }
        Ok(balances)
    }

    async fn send_to(&self, request: SendRequest) -> Result<Vec<TxRecord>, IpcError> {
        if request.amount == 0 {
            return Err(IpcError::InvalidParams { message: "amount must be positive".to_owned() });
        }
        if request.address.is_empty() {
            return Err(IpcError::InvalidParams { message: "address must not be empty".to_owned() });
        }
        let fee = request.fees.unwrap_or(DEFAULT_FEE);
        let needed = request.amount.saturating_add(fee);

        let mut state = self.state()?;
        let selected = state.select(&request.accounts)?;
        let available = saturating_sum(
            selected.iter().map(|&i| state.accounts[i].spendable(request.use_unconfirmed)),
        );
        if available < needed {
            return Err(IpcError::wallet(format!(
                "Insufficient funds: need {needed} satoshis, {available} spendable"
            )));
        }

        let mut remaining = needed;
        for &i in &selected {
            let account = &mut state.accounts[i];
            let taken = remaining.min(account.spendable(request.use_unconfirmed));
            account.debit(taken, request.use_unconfirmed);
            remaining -= taken;
            if remaining == 0 {
                break;
            }
        }
        let txid = self.next_txid(&mut state);
        log::info!(
            "memory wallet sent amount={} fee={fee} to={} txid={txid}",
            request.amount,
            request.address
        );
        Ok(vec![TxRecord { txid, amount: request.amount, fee }])
    }

    async fn spread_utxos(
        &self,
        threshold: u64,
        num_addresses: u32,
        accounts: &[String],
    ) -> Result<Vec<TxRecord>, IpcError> {
        if !(MIN_SPREAD_ADDRESSES..=MAX_SPREAD_ADDRESSES).contains(&num_addresses) {
            return Err(IpcError::InvalidParams {
                message: format!(
                    "num_addresses must be between {} and {}",
                    MIN_SPREAD_ADDRESSES, MAX_SPREAD_ADDRESSES
                ),
            });
        }

        let mut state = self.state()?;
        let selected = state.select(accounts)?;
        let mut records = Vec::new();
        for i in selected {
            let account = &state.accounts[i];
            let amount = saturating_sum(
                account
                    .addresses
                    .iter()
                    .map(|(_, funds)| funds.confirmed)
                    .filter(|confirmed| *confirmed > threshold),
            );
            if amount <= DEFAULT_FEE {
                continue;
            }
            let (index, start) = (account.index, account.next_receive);

            let spread = amount - DEFAULT_FEE;
            let share = spread / u64::from(num_addresses);
            let remainder = spread % u64::from(num_addresses);
            let outputs: Vec<(String, Funds)> = (0..num_addresses)
                .map(|n| {
                    let extra = if n == 0 { remainder } else { 0 };
                    let funds = Funds { confirmed: share + extra, unconfirmed: 0 };
                    (self.address(index, start + n), funds)
                })
                .collect();
            let account = &mut state.accounts[i];
            for (_, funds) in &mut account.addresses {
                if funds.confirmed > threshold {
                    funds.confirmed = 0;
                }
            }
            account.addresses.retain(|(_, funds)| funds.confirmed > 0 || funds.unconfirmed > 0);
            account.addresses.extend(outputs);
            account.next_receive = start + num_addresses;

            let txid = self.next_txid(&mut state);
            records.push(TxRecord { txid, amount: spread, fee: DEFAULT_FEE });
        }
        Ok(records)
    }

    async fn create_account(&self, name: &str) -> Result<bool, IpcError> {
        let name = name.trim();
        if name.is_empty() {
            let message = "account name must not be empty".to_owned();
            return Err(IpcError::InvalidParams { message });
        }
        let mut state = self.state()?;
        if state.account(name).is_ok() {
            return Ok(false);
        }
        self.insert_account(&mut state, name);
        log::info!("memory wallet created account name={name}");
        Ok(true)
    }

    async fn sweep(&self, address: &str, accounts: &[String]) -> Result<Vec<String>, IpcError> {
        let mut state = self.state()?;
        let selected = state.select(accounts)?;
        let mut txids = Vec::new();
        for i in selected {
            if state.accounts[i].confirmed() <= DEFAULT_FEE {
                continue;
            }
            for (_, funds) in &mut state.accounts[i].addresses {
                funds.confirmed = 0;
            }
            let txid = self.next_txid(&mut state);
            let name = &state.accounts[i].name;
            log::info!("memory wallet swept account={name} to={address} txid={txid}");
            txids.push(txid);
        }
        if txids.is_empty() {
            return Err(IpcError::wallet("Insufficient funds to sweep"));
        }
        Ok(txids)
    }

    async fn sign_bitcoin_message(&self, message: &str, address: &str) -> Result<String, IpcError> {
        let state = self.state()?;
        if !state.owns(address) {
            let message = format!("Address {address} does not belong to this wallet");
            return Err(IpcError::wallet(message));
        }
        Ok(self.signature(message, address))
    }

    async fn verify_bitcoin_message(
        &self,
        message: &str,
        signature: &str,
        address: &str,
    ) -> Result<bool, IpcError> {
        let state = self.state()?;
        Ok(state.owns(address) && self.signature(message, address) == signature)
    }

    async fn sync_wallet_file(&self) -> Result<(), IpcError> {
        let _state = self.state()?;
        let syncs = self.syncs.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("memory wallet synced count={syncs}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded() -> MemoryWallet {
        let accounts = vec![
            AccountConfig { name: DEFAULT_ACCOUNT.into(), confirmed: 100_000, unconfirmed: 5_000 },
            AccountConfig { name: "savings".to_owned(), confirmed: 50_000, unconfirmed: 0 },
        ];
        MemoryWallet::from_config(DEFAULT_SEED, &accounts).expect("wallet")
    }

    #[tokio::test]
    async fn balances_sum_over_accounts() {
        let wallet = funded();
        assert_eq!(wallet.confirmed_balance(None).await.expect("all"), 150_000);
        assert_eq!(wallet.confirmed_balance(Some("savings")).await.expect("savings"), 50_000);
        assert_eq!(wallet.unconfirmed_balance(None).await.expect("total"), 155_000);
        assert!(wallet.confirmed_balance(Some("missing")).await.is_err());
    }

    #[tokio::test]
    async fn oversized_balances_clamp_instead_of_overflowing() {
        let accounts = vec![
            AccountConfig { name: DEFAULT_ACCOUNT.into(), confirmed: u64::MAX, unconfirmed: 7 },
            AccountConfig { name: "savings".into(), confirmed: u64::MAX, unconfirmed: 0 },
        ];
        let wallet = MemoryWallet::from_config(DEFAULT_SEED, &accounts).expect("wallet");
        wallet.fund(DEFAULT_ACCOUNT, u64::MAX, 0).expect("second address");

        assert_eq!(wallet.confirmed_balance(None).await.expect("all"), u64::MAX);
        assert_eq!(wallet.unconfirmed_balance(Some(DEFAULT_ACCOUNT)).await.expect("one"), u64::MAX);
        let balances = wallet.balances_by_address(Some(DEFAULT_ACCOUNT)).await.expect("balances");
        assert!(balances.values().all(|balance| balance.total >= balance.confirmed));
        assert_eq!(balances.values().map(|balance| balance.total).max(), Some(u64::MAX));

        let sent = wallet.send_to(SendRequest::new("1destination", 1_000)).await.expect("send");
        assert_eq!(sent[0].amount, 1_000);
    }

    #[tokio::test]
    async fn accounts_keep_creation_order() {
        let wallet = funded();
        assert!(wallet.create_account("spending").await.expect("create"));
        assert!(!wallet.create_account("spending").await.expect("duplicate"));
        assert!(matches!(
            wallet.create_account("  ").await,
            Err(IpcError::InvalidParams { .. })
        ));

        assert_eq!(
            wallet.account_names().await.expect("names"),
            vec!["default".to_owned(), "savings".to_owned(), "spending".to_owned()]
        );
        let indices: Vec<u32> =
            wallet.list_accounts().await.expect("accounts").iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn addresses_are_deterministic_per_seed() {
        let first = funded();
        let second = funded();
        let other = MemoryWallet::new("another-seed");

        let address = first.payout_address(None).await.expect("payout");
        assert_eq!(address, second.payout_address(None).await.expect("payout"));
        assert_ne!(address, other.payout_address(None).await.expect("payout"));
        assert_eq!(address.len(), 34);
        assert!(address.starts_with('1'));

        let funded_address = first.fund(DEFAULT_ACCOUNT, 1, 0).expect("fund");
        assert_eq!(funded_address, address);
        assert_ne!(first.payout_address(None).await.expect("payout"), address);
    }

    #[tokio::test]
    async fn send_debits_amount_plus_fee_or_fails_whole() {
        let wallet = funded();
        let mut request = SendRequest::new("1destination", 120_000);
        request.fees = Some(1_000);
        let records = wallet.send_to(request).await.expect("send");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 120_000);
        assert_eq!(records[0].fee, 1_000);
        assert_eq!(records[0].txid.len(), 64);
        assert_eq!(wallet.confirmed_balance(None).await.expect("after"), 29_000);

        let err = wallet
            .send_to(SendRequest::new("1destination", 25_000))
            .await
            .expect_err("needs 35_000 with the default fee");
        assert!(err.to_string().starts_with("Insufficient funds"), "{err}");
        assert_eq!(wallet.confirmed_balance(None).await.expect("unchanged"), 29_000);

        let mut unconfirmed = SendRequest::new("1destination", 20_000);
        unconfirmed.use_unconfirmed = true;
        unconfirmed.fees = Some(14_000);
        wallet.send_to(unconfirmed).await.expect("spends unconfirmed too");
        assert_eq!(wallet.unconfirmed_balance(None).await.expect("after"), 0);
    }

    #[tokio::test]
    async fn send_rejects_zero_amount() {
        let wallet = funded();
        let err = wallet.send_to(SendRequest::new("1destination", 0)).await.expect_err("zero");
        assert!(matches!(err, IpcError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn spread_moves_large_balances_to_fresh_addresses() {
        let wallet = funded();
        let records = wallet
            .spread_utxos(60_000, 4, &[DEFAULT_ACCOUNT.to_owned()])
            .await
            .expect("spread");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 90_000);

        let balances = wallet.balances_by_address(Some(DEFAULT_ACCOUNT)).await.expect("balances");
        let confirmed: Vec<u64> =
            balances.values().map(|b| b.confirmed).filter(|c| *c > 0).collect();
        assert_eq!(confirmed.len(), 4);
        assert_eq!(confirmed.iter().sum::<u64>(), 90_000);

        assert!(matches!(
            wallet.spread_utxos(0, 1, &[]).await,
            Err(IpcError::InvalidParams { .. })
        ));
        assert!(matches!(
            wallet.spread_utxos(0, 101, &[]).await,
            Err(IpcError::InvalidParams { .. })
        ));
    }

    #[tokio::test]
    async fn sweep_empties_confirmed_funds() {
        let wallet = funded();
        let txids = wallet.sweep("1elsewhere", &[]).await.expect("sweep");
        assert_eq!(txids.len(), 2);
        assert_eq!(wallet.confirmed_balance(None).await.expect("after"), 0);
        assert!(wallet.sweep("1elsewhere", &[]).await.is_err());
    }

    #[tokio::test]
    async fn signatures_verify_only_for_the_signed_message() {
        let wallet = funded();
        let addresses = wallet.addresses(&["savings".to_owned()]).await.expect("addresses");
        let address = addresses["savings"][0].clone();

        let signature = wallet.sign_bitcoin_message("hello", &address).await.expect("sign");
        let verified = wallet.verify_bitcoin_message("hello", &signature, &address).await;
        assert!(verified.expect("verify"));
        let tampered = wallet.verify_bitcoin_message("hullo", &signature, &address).await;
        assert!(!tampered.expect("verify"));
        assert!(wallet.sign_bitcoin_message("hello", "1notmine").await.is_err());
    }

    #[tokio::test]
    async fn sync_is_counted() {
        let wallet = MemoryWallet::new(DEFAULT_SEED);
        wallet.sync_wallet_file().await.expect("sync");
        wallet.sync_wallet_file().await.expect("sync");
        assert_eq!(wallet.sync_count(), 2);
    }
}
