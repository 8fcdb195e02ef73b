//! Command façade
//!
//! [`Command`] is the value a domain binding builds, hands to a connection, and reads
//! back: `Command::new` → `send_command` → `error()` / `marshal_result()`.
//! [`call`] folds the three steps into one for the common case.

use super::dispatcher::SubscriptionHandle;
use super::traits::CdpConnection;
use super::types::CdpEvent;
use crate::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One CDP command and, once sent, its outcome
#[derive(Debug, Clone)]
pub struct Command {
    id: Option<u64>,
    method: String,
    params: Value,
    timeout: Option<Duration>,
    result: Option<Bytes>,
    error: Option<Error>,
}

impl Command {
    /// Build a command, serializing `params` right away.
    ///
    /// A serialization failure is recorded as the command's error; such a command
    /// is never written to the connection.
    pub fn new<P>(method: impl Into<String>, params: &P) -> Self
    where
        P: Serialize + ?Sized,
    {
        let method = method.into();
        match serde_json::to_value(params) {
            Ok(params) => Self::with_value(method, params),
            Err(e) => {
                let mut command = Self::with_value(method, Value::Null);
                command.error = Some(Error::encode(format!(
                    "Failed to serialize params for {}: {}",
                    command.method, e
                )));
                command
            }
        }
    }

    /// Build a command that carries no parameters
    pub fn without_params(method: impl Into<String>) -> Self {
        Self::with_value(method.into(), Value::Null)
    }

    fn with_value(method: String, params: Value) -> Self {
        Self {
            id: None,
            method,
            params,
            timeout: None,
            result: None,
            error: None,
        }
    }

    /// Override the configured deadline for this command
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// ID assigned when the command was sent
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the command already has a terminal outcome
    pub fn is_resolved(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// The command's error, if it failed
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Raw result payload, if the command succeeded
    pub fn result_bytes(&self) -> Option<&Bytes> {
        self.result.as_ref()
    }

    /// Decode the result payload into `T`
    pub fn marshal_result<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let bytes = self
            .result
            .as_ref()
            .ok_or_else(|| Error::decode(format!("{} has no result yet", self.method)))?;

        serde_json::from_slice(bytes).map_err(|e| {
            Error::decode(format!("Failed to decode {} result: {}", self.method, e))
        })
    }

    /// Consume the command, returning its error or the decoded result
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        self.marshal_result()
    }

    pub(crate) fn assign_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    pub(crate) fn take_params(&mut self) -> Value {
        std::mem::take(&mut self.params)
    }

    pub(crate) fn resolve(&mut self, outcome: Result<Bytes>) {
        match outcome {
            Ok(bytes) => self.result = Some(bytes),
            Err(e) => self.error = Some(e),
        }
    }
}

/// Send `method` with `params` and decode the result into `R`
pub async fn call<C, P, R>(conn: &C, method: &str, params: &P) -> Result<R>
where
    C: CdpConnection + ?Sized,
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut command = Command::new(method, params);
    conn.send_command(&mut command).await;
    command.into_result()
}

/// Send `method` with `params`, discarding the result payload
pub async fn call_unit<C, P>(conn: &C, method: &str, params: &P) -> Result<()>
where
    C: CdpConnection + ?Sized,
    P: Serialize + ?Sized,
{
    let mut command = Command::new(method, params);
    conn.send_command(&mut command).await;
    match command.error() {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

/// Send a method that takes no parameters, discarding the result payload
pub async fn call_without_params<C>(conn: &C, method: &str) -> Result<()>
where
    C: CdpConnection + ?Sized,
{
    let mut command = Command::without_params(method);
    conn.send_command(&mut command).await;
    match command.error() {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

/// A typed event payload with a fixed CDP event name
pub trait CdpEventKind: DeserializeOwned + Send + 'static {
    /// Event name, e.g. "DOM.attributeModified"
    const NAME: &'static str;
}

/// Subscribe with a handler that receives the decoded event payload.
///
/// A payload that does not decode into `E` is reported as a handler failure.
pub fn subscribe_typed<E, C, F>(conn: &C, handler: F) -> Result<SubscriptionHandle>
where
    E: CdpEventKind,
    C: CdpConnection + ?Sized,
    F: Fn(E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    conn.subscribe(
        E::NAME,
        Arc::new(move |event: &CdpEvent| -> anyhow::Result<()> {
            let params = match &event.params {
                Value::Null => Value::Object(Default::default()),
                params => params.clone(),
            };
            let typed: E = serde_json::from_value(params).map_err(|e| {
                Error::decode(format!("Failed to decode {} payload: {}", E::NAME, e))
            })?;
            handler(typed)
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct NodeResult {
        #[serde(rename = "nodeId")]
        node_id: i64,
    }

    #[test]
    fn test_new_serializes_params() {
        let command = Command::new("DOM.querySelector", &serde_json::json!({ "nodeId": 1, "selector": "p" }));
        assert_eq!(command.method(), "DOM.querySelector");
        assert_eq!(command.params()["selector"], "p");
        assert!(!command.is_resolved());
        assert!(command.error().is_none());
    }

    #[test]
    fn test_unserializable_params_fail_locally() {
        // Non-string map keys cannot become JSON object keys
        let mut params = HashMap::new();
        params.insert((1, 2), "x");

        let command = Command::new("DOM.setAttributeValue", &params);
        assert!(command.is_resolved());
        assert!(matches!(command.error(), Some(Error::Encode(_))));
        assert!(command.id().is_none());
    }

    #[test]
    fn test_marshal_result() {
        let mut command = Command::without_params("DOM.requestNode");
        command.assign_id(3);
        command.resolve(Ok(Bytes::from_static(br#"{"nodeId":42}"#)));

        assert_eq!(command.id(), Some(3));
        let result: NodeResult = command.marshal_result().unwrap();
        assert_eq!(result, NodeResult { node_id: 42 });

        let wrong: Result<Vec<String>> = command.marshal_result();
        assert!(matches!(wrong, Err(Error::Decode(_))));
    }

    #[test]
    fn test_marshal_before_send_is_decode_error() {
        let command = Command::without_params("DOM.enable");
        assert!(matches!(command.marshal_result::<Value>(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_error_wins_over_result() {
        let mut command = Command::without_params("DOM.enable").with_timeout(Duration::from_secs(1));
        assert_eq!(command.timeout(), Some(Duration::from_secs(1)));
        command.resolve(Err(Error::ConnectionClosed));
        assert!(command.into_result::<Value>().unwrap_err().is_closed());
    }
}
