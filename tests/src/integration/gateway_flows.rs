//! # Gateway Flows
//!
//! The gateway as an untrusted caller sees it: an HTTP endpoint behind the
//! permission gate, in front of a node with a bounded budget and a bounded
//! view of history.
//!
//! ## Flows Tested:
//!
//! 1. **Auth → Node → Backend**: anonymous reads pass, writes need a token
//! 2. **Admission**: the bucket admits ⌊capacity/cost⌋ calls, then times out
//! 3. **Freshness**: references inside the lookback cap pass, older ones fail
//! 4. **Write path**: `MpoolPush` reaches the node's untrusted pool entry

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::extract::{ConnectInfo, Extension, State};
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use chain_gateway::middleware::LimitFailure;
    use chain_gateway::ports::{AuthError, ManualTimeSource, VerifyRequest, VerifyResponse};
    use chain_gateway::testing::{sample_message, tipset_at, MockTarget};
    use chain_gateway::{
        AdmissionError, ApiError, AuthLayer, CallContext, FreshnessError, GatewayConfig,
        GatewayError, GatewayNode, Permissions, RateLimitConfig, Secp256k1Verifier, TargetApi,
        TimeSource, Verifier,
    };
    use shared_types::{Address, ChainEpoch, Signature, SigType, SignedMessage};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const NOW: u64 = 1_700_000_000;
    const HOUR: u64 = 3600;
    const HEAD: ChainEpoch = 50_000;

    struct Fixture {
        node: Arc<GatewayNode>,
        target: Arc<MockTarget>,
    }

    fn fixture(config: GatewayConfig) -> Fixture {
        crate::init_test_logging();
        let target = Arc::new(MockTarget::new(tipset_at("bafyhead", HEAD, NOW)));
        let node = GatewayNode::new(
            &config,
            target.clone() as Arc<dyn TargetApi>,
            Arc::new(ManualTimeSource::new(NOW)) as Arc<dyn TimeSource>,
            Arc::new(Secp256k1Verifier::new()),
        );
        Fixture {
            node: Arc::new(node),
            target,
        }
    }

    /// Token service accepting `token-<perm>`
    struct TokenService;

    #[async_trait]
    impl Verifier for TokenService {
        async fn verify(
            &self,
            _request: &VerifyRequest,
            token: &str,
        ) -> Result<VerifyResponse, AuthError> {
            token
                .strip_prefix("token-")
                .map(|perm| VerifyResponse {
                    name: "miner-ops".into(),
                    perm: perm.into(),
                    extra: String::new(),
                })
                .ok_or(AuthError::Rejected {
                    status: 401,
                    body: "unknown token".into(),
                })
        }
    }

    fn signed(nonce: u64) -> SignedMessage {
        SignedMessage {
            message: sample_message(nonce),
            signature: Signature {
                sig_type: SigType::Secp256k1,
                data: vec![0; 65],
            },
        }
    }

    /// Minimal JSON-RPC endpoint over the node
    async fn rpc(
        State(node): State<Arc<GatewayNode>>,
        Extension(_perms): Extension<Permissions>,
        Json(req): Json<Value>,
    ) -> Json<Value> {
        let ctx = CallContext::new();
        let result = match req["method"].as_str().unwrap_or_default() {
            "Filecoin.ChainHead" => node
                .chain_head(&ctx)
                .await
                .map(|ts| json!({ "Height": ts.height() })),
            "Filecoin.MpoolPush" => {
                let nonce = req["params"][0].as_u64().unwrap_or_default();
                node.mpool_push(&ctx, &signed(nonce)).await.map(|cid| json!(cid))
            }
            _ => Err(GatewayError::Unsupported),
        };

        Json(match result {
            Ok(value) => json!({ "jsonrpc": "2.0", "id": req["id"], "result": value }),
            Err(e) => json!({ "jsonrpc": "2.0", "id": req["id"], "error": ApiError::from(e) }),
        })
    }

    fn app(node: Arc<GatewayNode>) -> Router {
        Router::new()
            .route("/rpc/v1", post(rpc))
            .layer(AuthLayer::new(Arc::new(TokenService), "chain-gateway"))
            .with_state(node)
    }

    fn remote() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::new(198, 51, 100, 20), 52000))
    }

    fn rpc_request(method: &str, params: Value, token: Option<&str>) -> Request<Body> {
        framed_request(method, params, token, true)
    }

    /// `framed` sets the `x-rpc-method` header a JSON-RPC framing layer adds.
    fn framed_request(method: &str, params: Value, token: Option<&str>, framed: bool) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/rpc/v1")
            .header("content-type", "application/json")
            .extension(ConnectInfo(remote()));
        if framed {
            builder = builder.header("x-rpc-method", method);
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    // =============================================================================
    // INTEGRATION TESTS: AUTH → NODE → BACKEND
    // =============================================================================

    #[tokio::test]
    async fn test_anonymous_read_reaches_backend() {
        let f = fixture(GatewayConfig::default());
        let (status, body) = send(
            app(f.node.clone()),
            rpc_request("Filecoin.ChainHead", json!([]), None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["Height"], HEAD);
        assert_eq!(f.target.call_count("ChainHead"), 1);
    }

    #[tokio::test]
    async fn test_anonymous_write_refused_before_node() {
        let f = fixture(GatewayConfig::default());
        let (status, body) = send(
            app(f.node.clone()),
            rpc_request("Filecoin.MpoolPush", json!([1]), None),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("MpoolPush"));
        assert!(f.target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_write_refused_without_method_header() {
        let f = fixture(GatewayConfig::default());
        let (status, body) = send(
            app(f.node.clone()),
            framed_request("Filecoin.MpoolPush", json!([1]), None, false),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], -32010);
        assert!(f.target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_token_routes_push_to_untrusted_pool() {
        let f = fixture(GatewayConfig::default());
        let (status, body) = send(
            app(f.node.clone()),
            rpc_request("Filecoin.MpoolPush", json!([4]), Some("token-write")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "bafymsg4");
        assert_eq!(f.target.methods(), vec!["MpoolPushUntrusted"]);
    }

    #[tokio::test]
    async fn test_bad_token_is_unauthorized() {
        let f = fixture(GatewayConfig::default());
        let (status, _) = send(
            app(f.node.clone()),
            rpc_request("Filecoin.ChainHead", json!([]), Some("forged")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(f.target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_put_obj_refused_without_backend_call() {
        let f = fixture(GatewayConfig::default());
        let err = f
            .node
            .chain_put_obj(&CallContext::new(), &[1, 2, 3])
            .await
            .unwrap_err();
        assert_eq!(ApiError::from(err).code, -32004);
        assert!(f.target.calls().is_empty());
    }

    // =============================================================================
    // INTEGRATION TESTS: ADMISSION AND FRESHNESS
    // =============================================================================

    #[tokio::test]
    async fn test_bucket_admits_capacity_over_cost_then_times_out() {
        let f = fixture(GatewayConfig {
            rate_limit: RateLimitConfig {
                tokens_per_second: 1,
                burst: 6,
                timeout: Duration::from_millis(100),
                ..RateLimitConfig::default()
            },
            ..GatewayConfig::default()
        });
        let ctx = CallContext::new();
        let addr = Address::from("f01234");
        let head = shared_types::TipSetKey::EMPTY;

        // state calls cost 3: capacity 6 admits two
        for _ in 0..2 {
            f.node.state_get_actor(&ctx, &addr, &head).await.unwrap();
        }
        let err = f
            .node
            .state_get_actor(&ctx, &addr, &head)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Admission(AdmissionError::ServerBusy(LimitFailure::DeadlineExceeded))
        ));
        assert_eq!(ApiError::from(err).code, -32029);
        assert_eq!(f.target.call_count("StateGetActor"), 2);
    }

    #[tokio::test]
    async fn test_lookback_cap_bounds_history() {
        let f = fixture(GatewayConfig::default());
        let ctx = CallContext::new();
        let addr = Address::from("f01234");

        let recent = tipset_at("bafyrecent", HEAD - 2760, NOW - 23 * HOUR);
        let ancient = tipset_at("bafyancient", HEAD - 3000, NOW - 25 * HOUR);
        f.target.add_tipset(recent.clone());
        f.target.add_tipset(ancient.clone());

        f.node
            .state_get_actor(&ctx, &addr, recent.key())
            .await
            .unwrap();

        let err = f
            .node
            .state_get_actor(&ctx, &addr, ancient.key())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Freshness(FreshnessError::BadTipset(_))
        ));
        assert_eq!(ApiError::from(err).code, -32602);
        assert_eq!(f.target.call_count("StateGetActor"), 1);
    }

    #[tokio::test]
    async fn test_future_height_rejected() {
        let f = fixture(GatewayConfig::default());
        let err = f
            .node
            .chain_get_tip_set_by_height(&CallContext::new(), HEAD + 1, &shared_types::TipSetKey::EMPTY)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "tipset height in future");
        assert_eq!(f.target.call_count("ChainGetTipSetByHeight"), 0);
    }
}
