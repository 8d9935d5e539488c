use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use walletd_ipc::{methods, IpcError, Params, SendRequest, WalletApi};

use crate::registry::{MethodRegistry, OperationError, OperationResult, RegistryError};

/// Registers every [`WalletApi`] operation under its wire name.
pub fn register_wallet<W>(
    registry: &mut MethodRegistry,
    wallet: Arc<W>,
) -> Result<(), RegistryError>
where
    W: WalletApi + 'static,
{
    bind(registry, &wallet, methods::CONFIRMED_BALANCE, |wallet, params| async move {
        params.expect_only(&["account"])?;
        let account: Option<String> = params.optional(0, "account")?;
        reply(wallet.confirmed_balance(account.as_deref()).await)
    })?;
    bind(registry, &wallet, methods::UNCONFIRMED_BALANCE, |wallet, params| async move {
        params.expect_only(&["account"])?;
        let account: Option<String> = params.optional(0, "account")?;
        reply(wallet.unconfirmed_balance(account.as_deref()).await)
    })?;
    bind(registry, &wallet, methods::PAYOUT_ADDRESS, |wallet, params| async move {
        params.expect_only(&["account"])?;
        let account: Option<String> = params.optional(0, "account")?;
        reply(wallet.payout_address(account.as_deref()).await)
    })?;
    bind(registry, &wallet, methods::ACCOUNT_NAMES, |wallet, params| async move {
        params.expect_only(&[])?;
        reply(wallet.account_names().await)
    })?;
    bind(registry, &wallet, methods::LIST_ACCOUNTS, |wallet, params| async move {
        params.expect_only(&[])?;
        reply(wallet.list_accounts().await)
    })?;
    bind(registry, &wallet, methods::ADDRESSES, |wallet, params| async move {
        params.expect_only(&["accounts"])?;
        let accounts: Vec<String> = params.optional(0, "accounts")?.unwrap_or_default();
        reply(wallet.addresses(&accounts).await)
    })?;
    bind(registry, &wallet, methods::BALANCES_BY_ADDRESS, |wallet, params| async move {
        params.expect_only(&["account"])?;
        let account: Option<String> = params.optional(0, "account")?;
        reply(wallet.balances_by_address(account.as_deref()).await)
    })?;
    bind(registry, &wallet, methods::SEND_TO, |wallet, params| async move {
        params.expect_only(&["address", "amount", "use_unconfirmed", "fees", "accounts"])?;
        let request = SendRequest {
            address: params.required(0, "address")?,
            amount: params.required(1, "amount")?,
            use_unconfirmed: params.optional(2, "use_unconfirmed")?.unwrap_or(false),
            fees: params.optional(3, "fees")?,
            accounts: params.optional(4, "accounts")?.unwrap_or_default(),
        };
        reply(wallet.send_to(request).await)
    })?;
    bind(registry, &wallet, methods::SPREAD_UTXOS, |wallet, params| async move {
        params.expect_only(&["threshold", "num_addresses", "accounts"])?;
        let threshold: u64 = params.required(0, "threshold")?;
        let num_addresses: u32 = params.required(1, "num_addresses")?;
        let accounts: Vec<String> = params.optional(2, "accounts")?.unwrap_or_default();
        reply(wallet.spread_utxos(threshold, num_addresses, &accounts).await)
    })?;
    bind(registry, &wallet, methods::CREATE_ACCOUNT, |wallet, params| async move {
        params.expect_only(&["name"])?;
        let name: String = params.required(0, "name")?;
        reply(wallet.create_account(&name).await)
    })?;
    bind(registry, &wallet, methods::SWEEP, |wallet, params| async move {
        params.expect_only(&["address", "accounts"])?;
        let address: String = params.required(0, "address")?;
        let accounts: Vec<String> = params.optional(1, "accounts")?.unwrap_or_default();
        reply(wallet.sweep(&address, &accounts).await)
    })?;
    bind(registry, &wallet, methods::SIGN_BITCOIN_MESSAGE, |wallet, params| async move {
        params.expect_only(&["message", "address"])?;
        let message: String = params.required(0, "message")?;
        let address: String = params.required(1, "address")?;
        reply(wallet.sign_bitcoin_message(&message, &address).await)
    })?;
    bind(registry, &wallet, methods::VERIFY_BITCOIN_MESSAGE, |wallet, params| async move {
        params.expect_only(&["message", "signature", "address"])?;
        let message: String = params.required(0, "message")?;
        let signature: String = params.required(1, "signature")?;
        let address: String = params.required(2, "address")?;
        reply(wallet.verify_bitcoin_message(&message, &signature, &address).await)
    })?;
    bind(registry, &wallet, methods::SYNC_WALLET_FILE, |wallet, params| async move {
        params.expect_only(&[])?;
        reply(wallet.sync_wallet_file().await)
    })?;
    Ok(())
}

fn bind<W, F, Fut>(
    registry: &mut MethodRegistry,
    wallet: &Arc<W>,
    method: &str,
    operation: F,
) -> Result<(), RegistryError>
where
    W: WalletApi + 'static,
    F: Fn(Arc<W>, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult> + Send + 'static,
{
    let wallet = Arc::clone(wallet);
    registry.register(method, move |params| operation(Arc::clone(&wallet), params))
}

fn reply<T: Serialize>(result: Result<T, IpcError>) -> OperationResult {
    let value = result?;
    serde_json::to_value(value)
        .map_err(|err| OperationError::failed(format!("failed to encode result: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::dispatch;
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use walletd_ipc::{code, AccountInfo, AddressBalance, Request, TxRecord};

    /// Records the last call it received; balances come back fixed.
    #[derive(Default)]
    struct RecordingWallet {
        last: Mutex<Option<String>>,
    }

    impl RecordingWallet {
        fn record(&self, call: String) {
            *self.last.lock().expect("recording mutex poisoned") = Some(call);
        }

        fn last(&self) -> Option<String> {
            self.last.lock().expect("recording mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl WalletApi for RecordingWallet {
        async fn confirmed_balance(&self, account: Option<&str>) -> Result<u64, IpcError> {
            self.record(format!("confirmed_balance({account:?})"));
            Ok(5000)
        }

        async fn unconfirmed_balance(&self, account: Option<&str>) -> Result<u64, IpcError> {
            self.record(format!("unconfirmed_balance({account:?})"));
            Ok(7000)
        }

        async fn payout_address(&self, _account: Option<&str>) -> Result<String, IpcError> {
            Ok("1payout".to_owned())
        }

        async fn account_names(&self) -> Result<Vec<String>, IpcError> {
            Ok(vec!["default".to_owned()])
        }

        async fn list_accounts(&self) -> Result<Vec<AccountInfo>, IpcError> {
            Ok(vec![AccountInfo { name: "default".to_owned(), index: 0 }])
        }

        async fn addresses(
            &self,
            accounts: &[String],
        ) -> Result<BTreeMap<String, Vec<String>>, IpcError> {
            self.record(format!("addresses({accounts:?})"));
            Ok(BTreeMap::new())
        }

        async fn balances_by_address(
            &self,
            _account: Option<&str>,
        ) -> Result<BTreeMap<String, AddressBalance>, IpcError> {
            Ok(BTreeMap::from([("1a".to_owned(), AddressBalance { confirmed: 1, total: 2 })]))
        }

        async fn send_to(&self, request: SendRequest) -> Result<Vec<TxRecord>, IpcError> {
            self.record(format!(
                "send_to({}, {}, {}, {:?}, {:?})",
                request.address,
                request.amount,
                request.use_unconfirmed,
                request.fees,
                request.accounts
            ));
            Err(IpcError::wallet("Insufficient funds"))
        }

        async fn spread_utxos(
            &self,
            threshold: u64,
            num_addresses: u32,
            _accounts: &[String],
        ) -> Result<Vec<TxRecord>, IpcError> {
            self.record(format!("spread_utxos({threshold}, {num_addresses})"));
            Ok(Vec::new())
        }

        async fn create_account(&self, name: &str) -> Result<bool, IpcError> {
            Ok(name != "default")
        }

        async fn sweep(
            &self,
            _address: &str,
            _accounts: &[String],
        ) -> Result<Vec<String>, IpcError> {
            Ok(vec!["txid".to_owned()])
        }

        async fn sign_bitcoin_message(
            &self,
            message: &str,
            address: &str,
        ) -> Result<String, IpcError> {
            Ok(format!("{address}:{message}"))
        }

        async fn verify_bitcoin_message(
            &self,
            message: &str,
            signature: &str,
            address: &str,
        ) -> Result<bool, IpcError> {
            Ok(signature == format!("{address}:{message}"))
        }

        async fn sync_wallet_file(&self) -> Result<(), IpcError> {
            self.record("sync_wallet_file".to_owned());
            Ok(())
        }
    }

    fn setup() -> (MethodRegistry, Arc<RecordingWallet>) {
        let wallet = Arc::new(RecordingWallet::default());
        let mut registry = MethodRegistry::new();
        register_wallet(&mut registry, Arc::clone(&wallet)).expect("register");
        (registry, wallet)
    }

    #[test]
    fn every_wire_method_is_registered() {
        let (registry, _wallet) = setup();
        assert_eq!(registry.len(), methods::ALL.len());
        for method in methods::ALL {
            assert!(registry.contains(method), "{method} missing");
        }
    }

    #[test]
    fn registering_twice_is_rejected() {
        let (mut registry, wallet) = setup();
        assert!(register_wallet(&mut registry, wallet).is_err());
    }

    #[tokio::test]
    async fn keyword_and_positional_arguments_reach_the_wallet() {
        let (registry, wallet) = setup();

        let request = Request::call(
            1_u64,
            methods::CONFIRMED_BALANCE,
            Params::new().kwarg("account", json!("savings")),
        );
        assert_eq!(dispatch(&registry, &request).await.expect("balance"), json!(5000));
        assert_eq!(wallet.last().as_deref(), Some("confirmed_balance(Some(\"savings\"))"));

        let request = Request::call(2_u64, methods::UNCONFIRMED_BALANCE, Params::new());
        assert_eq!(dispatch(&registry, &request).await.expect("balance"), json!(7000));
        assert_eq!(wallet.last().as_deref(), Some("unconfirmed_balance(None)"));

        let request = Request::call(
            3_u64,
            methods::SPREAD_UTXOS,
            Params::new().arg(json!(100_000)).kwarg("num_addresses", json!(4)),
        );
        dispatch(&registry, &request).await.expect("spread");
        assert_eq!(wallet.last().as_deref(), Some("spread_utxos(100000, 4)"));
    }

    #[tokio::test]
    async fn wallet_failures_carry_the_operation_code() {
        let (registry, wallet) = setup();
        let request = Request::call(
            1_u64,
            methods::SEND_TO,
            Params::new().kwarg("address", json!("1dest")).kwarg("amount", json!(10)),
        );
        let err = dispatch(&registry, &request).await.expect_err("insufficient");
        assert_eq!(err.code, code::OPERATION_FAILED);
        assert_eq!(err.message, "Insufficient funds");
        assert_eq!(wallet.last().as_deref(), Some("send_to(1dest, 10, false, None, [])"));
    }

    #[tokio::test]
    async fn bad_arguments_never_reach_the_wallet() {
        let (registry, wallet) = setup();

        let typo = Params::new().kwarg("acount", json!("x"));
        let typo = Request::call(1_u64, methods::CONFIRMED_BALANCE, typo);
        let err = dispatch(&registry, &typo).await.expect_err("typo");
        assert_eq!(err.code, code::INVALID_PARAMS);

        let wrong_type = Params::new().arg(json!("1dest")).arg(json!("ten"));
        let wrong_type = Request::call(2_u64, methods::SEND_TO, wrong_type);
        let err = dispatch(&registry, &wrong_type).await.expect_err("type");
        assert_eq!(err.code, code::INVALID_PARAMS);

        assert_eq!(wallet.last(), None);
    }

    #[tokio::test]
    async fn structured_results_serialize_as_json() {
        let (registry, _wallet) = setup();

        let request = Request::call(1_u64, methods::BALANCES_BY_ADDRESS, Params::new());
        assert_eq!(
            dispatch(&registry, &request).await.expect("balances"),
            json!({"1a": {"confirmed": 1, "total": 2}})
        );

        let request = Request::call(2_u64, methods::LIST_ACCOUNTS, Params::new());
        assert_eq!(
            dispatch(&registry, &request).await.expect("accounts"),
            json!([{"name": "default", "index": 0}])
        );

        let request = Request::call(3_u64, methods::SYNC_WALLET_FILE, Params::new());
        assert_eq!(dispatch(&registry, &request).await.expect("sync"), JsonValue::Null);
    }
}
