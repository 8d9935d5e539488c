use std::path::Path;
use std::sync::Arc;

use walletd::config::{AccountConfig, DaemonConfig};
use walletd::daemon::{Daemon, DaemonError};
use walletd_ipc::{code, IpcError, SendRequest, WalletApi, WalletClient};

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

fn config(path: &Path) -> DaemonConfig {
    DaemonConfig {
        socket_path: Some(path.to_path_buf()),
        poll_interval_ms: Some(50),
        accounts: vec![
            AccountConfig { name: "default".into(), confirmed: 100_000, unconfirmed: 5_000 },
            AccountConfig { name: "savings".into(), confirmed: 50_000, unconfirmed: 0 },
        ],
        ..DaemonConfig::default()
    }
}

#[tokio::test]
async fn client_drives_the_wallet_through_the_socket() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("walletd.e2e.sock");
    let daemon = Daemon::start(&config(&path)).await.expect("daemon");
    let wallet = Arc::clone(daemon.wallet());

    let client = WalletClient::connect(&path).await.expect("connect");
    assert_eq!(client.confirmed_balance(None).await.expect("confirmed"), 150_000);
    assert_eq!(client.unconfirmed_balance(Some("default")).await.expect("total"), 105_000);
    assert_eq!(
        client.account_names().await.expect("names"),
        vec!["default".to_owned(), "savings".to_owned()]
    );

    assert!(client.create_account("hot").await.expect("create"));
    assert!(!client.create_account("hot").await.expect("create again"));
    let accounts = client.list_accounts().await.expect("accounts");
    assert_eq!(accounts.last().map(|account| account.name.as_str()), Some("hot"));

    let sent = client
        .send_to(SendRequest::new("1destination", 20_000))
        .await
        .expect("send");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount, 20_000);
    assert_eq!(
        client.confirmed_balance(None).await.expect("after send"),
        150_000 - 20_000 - sent[0].fee
    );

    let err = client
        .send_to(SendRequest::new("1destination", 10_000_000))
        .await
        .expect_err("overdraft");
    assert!(
        matches!(&err, IpcError::Wallet { message } if message.starts_with("Insufficient funds")),
        "{err:?}"
    );

    let err = client.spread_utxos(0, 1, &[]).await.expect_err("too few addresses");
    assert!(
        matches!(err, IpcError::Remote { code: got, .. } if got == code::INVALID_PARAMS),
        "{err:?}"
    );

    let owned = client.addresses(&["default".to_owned()]).await.expect("addresses");
    let address = owned["default"][0].clone();
    let signature = client.sign_bitcoin_message("hello", &address).await.expect("sign");
    assert!(client.verify_bitcoin_message("hello", &signature, &address).await.expect("verify"));
    assert!(!client.verify_bitcoin_message("hullo", &signature, &address).await.expect("verify"));

    client.sync_wallet_file().await.expect("sync");
    // Frames on one connection are handled in order, so the sync has run
    // once the next call returns.
    client.account_names().await.expect("names");
    assert_eq!(wallet.sync_count(), 1);

    drop(client);
    daemon.shutdown().await.expect("shutdown");
    assert_eq!(wallet.sync_count(), 2);
    assert!(!path.exists());
}

#[tokio::test]
async fn second_daemon_exits_with_already_running() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("walletd.twice.sock");
    let first = Daemon::start(&config(&path)).await.expect("first daemon");

    let err = Daemon::start(&config(&path)).await.expect_err("second daemon");
    assert!(matches!(err, DaemonError::Server(_)), "{err}");
    assert_eq!(err.lifecycle_exit().code(), 3);

    let client = WalletClient::connect(&path).await.expect("first still serves");
    assert_eq!(client.confirmed_balance(Some("savings")).await.expect("balance"), 50_000);
    drop(client);

    first.shutdown().await.expect("shutdown");
    let err = WalletClient::connect(&path).await.expect_err("stopped");
    assert_eq!(err.lifecycle_exit().code(), 4);
}
