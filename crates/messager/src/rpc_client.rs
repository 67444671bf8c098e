//! JSON-RPC client for the remote message service.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared_types::{Address, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::MessagerError;
use crate::ports::MessagerApi;
use crate::types::{MessagerConfig, MsgDetail, MsgMeta};

/// Namespace the service registers its methods under.
const NAMESPACE: &str = "Message";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

pub struct RpcMessagerClient {
    http_client: reqwest::Client,
    rpc_url: String,
    token: String,
    request_id: AtomicU64,
}

impl RpcMessagerClient {
    pub fn new(config: &MessagerConfig) -> Result<Self, MessagerError> {
        if config.url.is_empty() {
            return Err(MessagerError::Config("messager url is empty".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MessagerError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            rpc_url: config.url.clone(),
            token: config.token.clone(),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call<P: Serialize + Send, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, MessagerError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let method = format!("{NAMESPACE}.{method}");
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: &method,
            params,
            id,
        };

        let mut builder = self.http_client.post(&self.rpc_url).json(&request);
        if !self.token.is_empty() {
            builder = builder.bearer_auth(&self.token);
        }
        debug!(method = %method, id, "Messager request");

        let response = builder
            .send()
            .await
            .map_err(|e| MessagerError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagerError::Transport(format!(
                "http status {}: {body}",
                status.as_u16()
            )));
        }

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| MessagerError::Decode(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(MessagerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        rpc_response
            .result
            .ok_or_else(|| MessagerError::Decode(format!("{method}: response missing result")))
    }
}

#[async_trait]
impl MessagerApi for RpcMessagerClient {
    async fn wallet_has(&self, addr: &Address) -> Result<bool, MessagerError> {
        self.call("WalletHas", (addr,)).await
    }

    async fn has_message_by_uid(&self, id: &str) -> Result<bool, MessagerError> {
        self.call("HasMessageByUid", (id,)).await
    }

    async fn push_message(&self, msg: &Message, meta: &MsgMeta) -> Result<String, MessagerError> {
        self.call("PushMessage", (msg, meta)).await
    }

    async fn push_message_with_id(
        &self,
        id: &str,
        msg: &Message,
        meta: &MsgMeta,
    ) -> Result<String, MessagerError> {
        self.call("PushMessageWithId", (id, msg, meta)).await
    }

    async fn get_message_by_uid(&self, id: &str) -> Result<MsgDetail, MessagerError> {
        self.call("GetMessageByUid", (id,)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::detail;
    use crate::types::MessageState;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn rpc(headers: HeaderMap, Json(req): Json<Value>) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer secret" {
            return (StatusCode::UNAUTHORIZED, Json(json!({})));
        }

        let id = req["id"].clone();
        let body = match req["method"].as_str().unwrap_or_default() {
            "Message.WalletHas" => json!({"jsonrpc": "2.0", "id": id, "result": req["params"][0] == "f1known"}),
            "Message.PushMessageWithId" => json!({"jsonrpc": "2.0", "id": id, "result": req["params"][0]}),
            "Message.GetMessageByUid" => {
                let found = detail(req["params"][0].as_str().unwrap_or_default(), MessageState::Final, 5);
                json!({"jsonrpc": "2.0", "id": id, "result": found})
            }
            other => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("method '{other}' not found")},
            }),
        };
        (StatusCode::OK, Json(body))
    }

    async fn serve() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/rpc/v0", post(rpc));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/rpc/v0")
    }

    fn client(url: &str, token: &str) -> RpcMessagerClient {
        RpcMessagerClient::new(&MessagerConfig::new(url, token)).unwrap()
    }

    #[test]
    fn test_empty_url_rejected() {
        let err = RpcMessagerClient::new(&MessagerConfig::default()).err().unwrap();
        assert!(matches!(err, MessagerError::Config(_)));
    }

    #[tokio::test]
    async fn test_calls_are_namespaced_and_authorized() {
        let url = serve().await;
        let client = client(&url, "secret");

        assert!(client.wallet_has(&Address::from("f1known")).await.unwrap());
        assert!(!client.wallet_has(&Address::from("f1other")).await.unwrap());

        let found = client.get_message_by_uid("msg-9").await.unwrap();
        assert_eq!(found.id, "msg-9");
        assert_eq!(found.state, MessageState::Final);

        let msg = detail("x", MessageState::Unknown, 0).message;
        let id = client
            .push_message_with_id("chosen-id", &msg, &MsgMeta::default())
            .await
            .unwrap();
        assert_eq!(id, "chosen-id");
    }

    #[tokio::test]
    async fn test_rpc_error_surfaces_code() {
        let url = serve().await;
        let err = client(&url, "secret")
            .has_message_by_uid("msg-1")
            .await
            .unwrap_err();
        assert!(matches!(err, MessagerError::Rpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_http_failure_is_transport_error() {
        let url = serve().await;
        let err = client(&url, "wrong").wallet_has(&Address::from("f1known")).await.unwrap_err();
        assert!(matches!(err, MessagerError::Transport(ref m) if m.starts_with("http status 401")));
    }
}
