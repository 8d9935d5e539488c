use std::convert::Infallible;

use serde_json::Value as JsonValue;
use walletd::config::DaemonConfig;
use walletd_ipc::{IpcError, LifecycleExit, Params, WalletClient};

#[derive(clap::Args, Debug)]
pub(crate) struct CallArgs {
    /// Wire method name, e.g. `confirmedBalance`.
    method: String,
    /// Positional argument as JSON; anything that is not JSON is sent as a
    /// string. Repeatable.
    #[arg(long = "arg", value_name = "JSON", value_parser = parse_value)]
    args: Vec<JsonValue>,
    /// Keyword argument as KEY=JSON. Repeatable.
    #[arg(long = "kwarg", value_name = "KEY=JSON", value_parser = parse_kwarg)]
    kwargs: Vec<(String, JsonValue)>,
    /// Send as a notification: do not wait for a result.
    #[arg(long)]
    notify: bool,
}

pub(crate) async fn run(config: &DaemonConfig, call: CallArgs) -> LifecycleExit {
    match execute(config, call).await {
        Ok(Some(value)) => {
            match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{value}"),
            }
            LifecycleExit::Success
        }
        Ok(None) => LifecycleExit::Success,
        Err(err) => {
            eprintln!("{err}");
            err.lifecycle_exit()
        }
    }
}

async fn execute(config: &DaemonConfig, call: CallArgs) -> Result<Option<JsonValue>, IpcError> {
    let client = WalletClient::connect(config.resolved_socket_path()?).await?;
    let params = call.args.into_iter().fold(Params::new(), Params::arg);
    let params =
        call.kwargs.into_iter().fold(params, |params, (key, value)| params.kwarg(key, value));
    client.invoke(&call.method, params, !call.notify).await
}

fn parse_value(raw: &str) -> Result<JsonValue, Infallible> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_owned())))
}

fn parse_kwarg(raw: &str) -> Result<(String, JsonValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=JSON, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty keyword in '{raw}'"));
    }
    let Ok(value) = parse_value(value);
    Ok((key.to_owned(), value))
}
