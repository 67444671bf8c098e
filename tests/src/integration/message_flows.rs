//! # Message Flows
//!
//! Pushing a message through the messager and waiting for it to land.
//!
//! ## Flows Tested:
//!
//! 1. **Push → Wait**: confidence accumulates across polls until satisfied
//! 2. **Over JSON-RPC**: the same wait against a live HTTP message service
//! 3. **Cancellation**: a caller walking away ends the wait with no result

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use chain_gateway::testing::sample_message;
    use messager::testing::{detail, failed, ScriptedMessager};
    use messager::{MessageState, Messager, MessagerConfig, MsgMeta, WaitError};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn config(url: &str, poll: Duration) -> MessagerConfig {
        MessagerConfig {
            poll_interval: poll,
            ..MessagerConfig::new(url, "messager-token")
        }
    }

    /// Message service whose only message gains a confirmation per lookup
    async fn service(State(seen): State<Arc<AtomicI64>>, Json(req): Json<Value>) -> Json<Value> {
        let id = req["id"].clone();
        match req["method"].as_str().unwrap_or_default() {
            "Message.PushMessage" => Json(json!({"jsonrpc": "2.0", "id": id, "result": "remote-1"})),
            "Message.GetMessageByUid" => {
                let confidence = seen.fetch_add(1, Ordering::SeqCst);
                let found = detail("remote-1", MessageState::PendingOnChain, confidence);
                Json(json!({"jsonrpc": "2.0", "id": id, "result": found}))
            }
            other => Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("unknown method {other}")},
            })),
        }
    }

    async fn serve(seen: Arc<AtomicI64>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/rpc/v0", post(service))
            .with_state(seen);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/rpc/v0")
    }

    // =============================================================================
    // INTEGRATION TESTS: PUSH → WAIT
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_push_then_wait_for_confidence() {
        let api = Arc::new(ScriptedMessager::new());
        let messager = Messager::new(api.clone(), &config("http://messager", Duration::from_secs(30)));

        let id = messager
            .push_message(&sample_message(3), &MsgMeta::default())
            .await
            .unwrap();
        api.script(
            &id,
            vec![
                Ok(detail(&id, MessageState::PendingOffChain, 0)),
                Ok(detail(&id, MessageState::PendingOnChain, 0)),
                Ok(detail(&id, MessageState::Final, 1)),
                Ok(detail(&id, MessageState::Final, 2)),
            ],
        );

        let landed = messager
            .wait_message(&CancellationToken::new(), &id, 2)
            .await
            .unwrap();
        assert_eq!(landed.state, MessageState::Final);
        assert_eq!(api.fetches(&id), 4);
        assert_eq!(api.pushed()[0].1.nonce, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_message_reports_receipt() {
        let api = Arc::new(ScriptedMessager::new());
        api.script(
            "m-fail",
            vec![
                Ok(detail("m-fail", MessageState::PendingOnChain, 0)),
                Ok(failed("m-fail", "SysErrInsufficientFunds")),
            ],
        );
        let messager = Messager::new(api.clone(), &config("http://messager", Duration::from_secs(30)));

        let err = messager
            .wait_message(&CancellationToken::new(), "m-fail", 1)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "msg failed due to SysErrInsufficientFunds");
    }

    #[tokio::test]
    async fn test_wait_over_json_rpc() {
        let seen = Arc::new(AtomicI64::new(0));
        let url = serve(seen.clone()).await;
        let messager = Messager::connect(&config(&url, Duration::from_millis(20))).unwrap();

        let id = messager
            .push_message(&sample_message(1), &MsgMeta::default())
            .await
            .unwrap();
        let landed = messager
            .wait_message(&CancellationToken::new(), &id, 2)
            .await
            .unwrap();

        assert_eq!(landed.id, "remote-1");
        assert_eq!(landed.confidence, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait() {
        let api = Arc::new(ScriptedMessager::new());
        api.script("m-slow", vec![Ok(detail("m-slow", MessageState::PendingOffChain, 0))]);
        let messager = Arc::new(Messager::new(
            api.clone(),
            &config("http://messager", Duration::from_secs(30)),
        ));
        let cancel = CancellationToken::new();

        let waiter = {
            let messager = messager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { messager.wait_message(&cancel, "m-slow", 1).await })
        };
        tokio::time::sleep(Duration::from_secs(100)).await;
        cancel.cancel();

        assert!(matches!(waiter.await.unwrap(), Err(WaitError::Cancelled)));
        assert_eq!(api.fetches("m-slow"), 4);
    }
}
