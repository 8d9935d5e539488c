use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

/// Protocol marker carried on every response and on requests built here.
pub const JSONRPC_VERSION: &str = "2.0";

/// Message attached to every lock-timeout error response.
pub const LOCK_TIMEOUT_MESSAGE: &str = "Timed out waiting for lock";

/// Numeric error codes carried in [`RpcError::code`].
pub mod code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// The shared mutation lock could not be acquired in time. The operation
    /// was never invoked.
    pub const LOCK_TIMEOUT: i64 = -32000;
    /// The wallet operation ran and reported a failure.
    pub const OPERATION_FAILED: i64 = -32001;
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Any JSON number or string. `Null` is an id the caller sent explicitly as
/// `null`: it still asks for a response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(JsonNumber),
    Text(String),
    Null,
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Null => f.write_str("null"),
        }
    }
}

/// One decoded request frame.
///
/// `params` stays raw until dispatch so a shape mismatch can be reported as
/// `INVALID_PARAMS` against the request's own id. A request without an `id`
/// member is a notification and never receives a response; `"id": null`
/// decodes to [`RequestId::Null`] and is answered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonValue>,
    #[serde(default, deserialize_with = "present_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

/// Only called when the member is present, so `null` becomes
/// `Some(RequestId::Null)` and absence stays `None` via `default`.
fn present_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RequestId>, D::Error> {
    RequestId::deserialize(deserializer).map(Some)
}

impl Request {
    pub fn call(id: impl Into<RequestId>, method: impl Into<String>, params: Params) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_owned()),
            method: method.into(),
            params: Some(params.into_value()),
            id: Some(id.into()),
        }
    }

    pub fn notify(method: impl Into<String>, params: Params) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_owned()),
            method: method.into(),
            params: Some(params.into_value()),
            id: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

// ── Params ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParamsError(pub String);

/// Positional and keyword arguments of one call.
///
/// On the wire this is `{"args": [...], "kwargs": {...}}`. Decoding also
/// accepts that object wrapped in a one-element array, a bare array of
/// positional arguments, or a bare object of keyword arguments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default)]
    pub args: Vec<JsonValue>,
    #[serde(default)]
    pub kwargs: JsonMap<String, JsonValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: JsonValue) -> Self {
        self.args.push(value);
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    pub fn into_value(self) -> JsonValue {
        let mut object = JsonMap::new();
        object.insert("args".to_owned(), JsonValue::Array(self.args));
        object.insert("kwargs".to_owned(), JsonValue::Object(self.kwargs));
        JsonValue::Object(object)
    }

    pub fn from_value(value: Option<JsonValue>) -> Result<Self, ParamsError> {
        match value {
            None | Some(JsonValue::Null) => Ok(Self::default()),
            Some(JsonValue::Object(object)) => {
                if is_envelope(&object) {
                    Self::from_envelope(object)
                } else {
                    Ok(Self { args: Vec::new(), kwargs: object })
                }
            }
            Some(JsonValue::Array(mut items)) => {
                let wrapped =
                    items.len() == 1 && matches!(&items[0], JsonValue::Object(o) if is_envelope(o));
                match (wrapped, items.pop()) {
                    (true, Some(JsonValue::Object(object))) => Self::from_envelope(object),
                    (_, last) => {
                        items.extend(last);
                        Ok(Self { args: items, kwargs: JsonMap::new() })
                    }
                }
            }
            Some(other) => Err(ParamsError(format!(
                "params must be an array or an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn from_envelope(mut object: JsonMap<String, JsonValue>) -> Result<Self, ParamsError> {
        let args = match object.remove("args") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(args)) => args,
            Some(other) => {
                return Err(ParamsError(format!(
                    "args must be an array, got {}",
                    json_kind(&other)
                )))
            }
        };
        let kwargs = match object.remove("kwargs") {
            None | Some(JsonValue::Null) => JsonMap::new(),
            Some(JsonValue::Object(kwargs)) => kwargs,
            Some(other) => {
                return Err(ParamsError(format!(
                    "kwargs must be an object, got {}",
                    json_kind(&other)
                )))
            }
        };
        Ok(Self { args, kwargs })
    }

    /// Rejects positional arguments beyond `names` and unknown keywords.
    pub fn expect_only(&self, names: &[&str]) -> Result<(), ParamsError> {
        if self.args.len() > names.len() {
            return Err(ParamsError(format!(
                "takes at most {} positional argument(s) but {} were given",
                names.len(),
                self.args.len()
            )));
        }
        for (position, name) in names.iter().enumerate() {
            if position < self.args.len() && self.kwargs.contains_key(*name) {
                return Err(ParamsError(format!("got multiple values for argument '{name}'")));
            }
        }
        if let Some(unknown) = self.kwargs.keys().find(|key| !names.contains(&key.as_str())) {
            return Err(ParamsError(format!("got an unexpected keyword argument '{unknown}'")));
        }
        Ok(())
    }

    fn lookup(&self, position: usize, name: &str) -> Option<&JsonValue> {
        self.kwargs.get(name).or_else(|| self.args.get(position))
    }

    /// Argument `name` (or the positional argument at `position`); missing or
    /// `null` is an error.
    pub fn required<T: DeserializeOwned>(
        &self,
        position: usize,
        name: &str,
    ) -> Result<T, ParamsError> {
        match self.lookup(position, name) {
            None | Some(JsonValue::Null) => {
                Err(ParamsError(format!("missing required argument '{name}'")))
            }
            Some(value) => decode_argument(name, value),
        }
    }

    /// Like [`Params::required`] but missing or `null` yields `None`.
    pub fn optional<T: DeserializeOwned>(
        &self,
        position: usize,
        name: &str,
    ) -> Result<Option<T>, ParamsError> {
        match self.lookup(position, name) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => decode_argument(name, value).map(Some),
        }
    }
}

fn is_envelope(object: &JsonMap<String, JsonValue>) -> bool {
    !object.is_empty() && object.keys().all(|key| key == "args" || key == "kwargs")
}

fn decode_argument<T: DeserializeOwned>(name: &str, value: &JsonValue) -> Result<T, ParamsError> {
    T::deserialize(value).map_err(|err| ParamsError(format!("argument '{name}': {err}")))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn parse_error(detail: impl fmt::Display) -> Self {
        Self::new(code::PARSE_ERROR, format!("Parse error: {detail}"))
    }

    pub fn invalid_request(detail: impl fmt::Display) -> Self {
        Self::new(code::INVALID_REQUEST, format!("Invalid request: {detail}"))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(code::METHOD_NOT_FOUND, format!("Method not found: {method}"))
            .with_data(JsonValue::String(method.to_owned()))
    }

    pub fn invalid_params(detail: impl fmt::Display) -> Self {
        Self::new(code::INVALID_PARAMS, format!("Invalid params: {detail}"))
    }

    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::new(code::INTERNAL_ERROR, format!("Internal error: {detail}"))
    }

    pub fn lock_timeout() -> Self {
        Self::new(code::LOCK_TIMEOUT, LOCK_TIMEOUT_MESSAGE)
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(code::OPERATION_FAILED, message)
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// Exactly one of `result` or `error`; the enum makes "both" and "neither"
/// unrepresentable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(JsonValue),
    Error(RpcError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// `None` only when the request id could not be recovered.
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_owned()
}

impl Response {
    pub fn success(id: Option<RequestId>, result: JsonValue) -> Self {
        Self { jsonrpc: jsonrpc_version(), id, outcome: Outcome::Result(result) }
    }

    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self { jsonrpc: jsonrpc_version(), id, outcome: Outcome::Error(error) }
    }

    pub fn from_result(id: Option<RequestId>, result: Result<JsonValue, RpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::failure(id, error),
        }
    }

    pub fn error(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }

    pub fn into_result(self) -> Result<JsonValue, RpcError> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(error),
        }
    }
}
