use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value as JsonValue;
use walletd_ipc::{Params, Request, RequestId, RpcError};

use crate::registry::MethodRegistry;

/// Decodes one frame into a request.
///
/// On failure the error carries whatever id could be salvaged from the frame
/// so the error response can still be correlated.
pub fn decode_request(line: &str) -> Result<Request, (Option<RequestId>, RpcError)> {
    let value: JsonValue =
        serde_json::from_str(line).map_err(|err| (None, RpcError::parse_error(err)))?;
    let JsonValue::Object(object) = &value else {
        return Err((None, RpcError::invalid_request("expected a JSON object")));
    };
    let id = object
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
    match object.get("method") {
        Some(JsonValue::String(_)) => {}
        Some(_) => return Err((id, RpcError::invalid_request("method must be a string"))),
        None => return Err((id, RpcError::invalid_request("missing method"))),
    }
    serde_json::from_value(value).map_err(|err| (id, RpcError::invalid_request(err)))
}

/// Runs the named operation with the request's params.
///
/// The caller holds the mutation lock. A panicking operation is reported as
/// an internal error and does not take the connection down.
pub async fn dispatch(
    registry: &MethodRegistry,
    request: &Request,
) -> Result<JsonValue, RpcError> {
    let Some(operation) = registry.operation(&request.method) else {
        return Err(RpcError::method_not_found(&request.method));
    };
    let params = Params::from_value(request.params.clone()).map_err(RpcError::invalid_params)?;

    match AssertUnwindSafe(operation(params)).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into_rpc_error()),
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "operation panicked".to_owned());
            log::error!("walletd operation panicked method={} detail={detail}", request.method);
            Err(RpcError::internal(detail))
        }
    }
}
