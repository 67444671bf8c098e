//! Chain read operations.

use shared_types::{
    ApiVersion, BlockHeader, BlockMessages, ChainEpoch, Cid, HeadChange, Message, MessageReceipt,
    ParentMessage, TipSet, TipSetKey,
};
use tokio::sync::mpsc;
use tracing::instrument;

use super::GatewayNode;
use crate::domain::context::CallContext;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::types::IpldObject;

impl GatewayNode {
    #[instrument(skip_all)]
    pub async fn version(&self, ctx: &CallContext) -> GatewayResult<ApiVersion> {
        self.call(ctx, "Version", async { Ok(self.target.version().await?) })
            .await
    }

    #[instrument(skip_all)]
    pub async fn chain_head(&self, ctx: &CallContext) -> GatewayResult<TipSet> {
        self.call(ctx, "ChainHead", async { Ok(self.target.chain_head().await?) })
            .await
    }

    #[instrument(skip(self, ctx), fields(cid = %cid))]
    pub async fn chain_get_block(&self, ctx: &CallContext, cid: &Cid) -> GatewayResult<BlockHeader> {
        self.call(ctx, "ChainGetBlock", async {
            Ok(self.target.chain_get_block(cid).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(cid = %cid))]
    pub async fn chain_get_block_messages(
        &self,
        ctx: &CallContext,
        cid: &Cid,
    ) -> GatewayResult<BlockMessages> {
        self.call(ctx, "ChainGetBlockMessages", async {
            Ok(self.target.chain_get_block_messages(cid).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(cid = %cid))]
    pub async fn chain_get_message(&self, ctx: &CallContext, cid: &Cid) -> GatewayResult<Message> {
        self.call(ctx, "ChainGetMessage", async {
            Ok(self.target.chain_get_message(cid).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(cid = %cid))]
    pub async fn chain_get_parent_messages(
        &self,
        ctx: &CallContext,
        cid: &Cid,
    ) -> GatewayResult<Vec<ParentMessage>> {
        self.call(ctx, "ChainGetParentMessages", async {
            Ok(self.target.chain_get_parent_messages(cid).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(cid = %cid))]
    pub async fn chain_get_parent_receipts(
        &self,
        ctx: &CallContext,
        cid: &Cid,
    ) -> GatewayResult<Vec<MessageReceipt>> {
        self.call(ctx, "ChainGetParentReceipts", async {
            Ok(self.target.chain_get_parent_receipts(cid).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(cid = %cid))]
    pub async fn chain_has_obj(&self, ctx: &CallContext, cid: &Cid) -> GatewayResult<bool> {
        self.call(ctx, "ChainHasObj", async {
            Ok(self.target.chain_has_obj(cid).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(cid = %cid))]
    pub async fn chain_read_obj(&self, ctx: &CallContext, cid: &Cid) -> GatewayResult<Vec<u8>> {
        self.call(ctx, "ChainReadObj", async {
            Ok(self.target.chain_read_obj(cid).await?)
        })
        .await
    }

    /// Storing objects on the node is never allowed through the gateway.
    #[instrument(skip_all)]
    pub async fn chain_put_obj(&self, ctx: &CallContext, _block: &[u8]) -> GatewayResult<()> {
        self.call(ctx, "ChainPutObj", async { Err(GatewayError::Unsupported) })
            .await
    }

    #[instrument(skip(self, ctx))]
    pub async fn chain_get_node(&self, ctx: &CallContext, path: &str) -> GatewayResult<IpldObject> {
        self.call(ctx, "ChainGetNode", async {
            Ok(self.target.chain_get_node(path).await?)
        })
        .await
    }

    #[instrument(skip_all)]
    pub async fn chain_get_genesis(&self, ctx: &CallContext) -> GatewayResult<TipSet> {
        self.call(ctx, "ChainGetGenesis", async {
            Ok(self.target.chain_get_genesis().await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn chain_get_tip_set(&self, ctx: &CallContext, tsk: &TipSetKey) -> GatewayResult<TipSet> {
        self.call(ctx, "ChainGetTipSet", async {
            Ok(self.target.chain_get_tip_set(tsk).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn chain_get_tip_set_by_height(
        &self,
        ctx: &CallContext,
        height: ChainEpoch,
        tsk: &TipSetKey,
    ) -> GatewayResult<TipSet> {
        self.call(ctx, "ChainGetTipSetByHeight", async {
            self.check_tipset_height(height, tsk).await?;
            Ok(self.target.chain_get_tip_set_by_height(height, tsk).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn chain_get_tip_set_after_height(
        &self,
        ctx: &CallContext,
        height: ChainEpoch,
        tsk: &TipSetKey,
    ) -> GatewayResult<TipSet> {
        self.call(ctx, "ChainGetTipSetAfterHeight", async {
            self.check_tipset_height(height, tsk).await?;
            Ok(self.target.chain_get_tip_set_after_height(height, tsk).await?)
        })
        .await
    }

    /// Both ends of the path are validated; a failure names the end.
    #[instrument(skip(self, ctx), fields(from = %from, to = %to))]
    pub async fn chain_get_path(
        &self,
        ctx: &CallContext,
        from: &TipSetKey,
        to: &TipSetKey,
    ) -> GatewayResult<Vec<HeadChange>> {
        self.call(ctx, "ChainGetPath", async {
            self.check_tipset_key(from)
                .await
                .map_err(|source| GatewayError::PathEndpoint {
                    endpoint: "from",
                    source,
                })?;
            self.check_tipset_key(to)
                .await
                .map_err(|source| GatewayError::PathEndpoint {
                    endpoint: "to",
                    source,
                })?;
            Ok(self.target.chain_get_path(from, to).await?)
        })
        .await
    }

    /// Head change subscription; the stream itself is not rate limited.
    #[instrument(skip_all)]
    pub async fn chain_notify(
        &self,
        ctx: &CallContext,
    ) -> GatewayResult<mpsc::Receiver<Vec<HeadChange>>> {
        self.call(ctx, "ChainNotify", async { Ok(self.target.chain_notify().await?) })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::domain::context::CallContext;
    use crate::domain::error::{ApiError, GatewayError};
    use crate::domain::freshness::FreshnessError;
    use shared_types::{HeadChangeType, TipSetKey};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_chain_put_obj_rejected_without_tokens() {
        let h = limited_harness(1);
        let ctx = CallContext::new();

        for _ in 0..10 {
            let err = h.node.chain_put_obj(&ctx, b"block").await.unwrap_err();
            assert_eq!(err.to_string(), "not supported");
        }
        // the bucket is still full: a state call (3 tokens) is admitted
        h.node.state_network_name(&ctx).await.unwrap();
        assert!(h.target.calls().iter().all(|c| c.method != "ChainPutObj"));
        assert_eq!(h.node.metrics().unsupported_rejected.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn test_height_lookup_uses_head_for_empty_key() {
        let h = harness();
        let ts = h
            .node
            .chain_get_tip_set_by_height(&CallContext::new(), HEAD_HEIGHT - 100, &TipSetKey::EMPTY)
            .await
            .unwrap();
        assert_eq!(ts.height(), HEAD_HEIGHT - 100);
        assert_eq!(h.target.methods(), vec!["ChainHead", "ChainGetTipSetByHeight"]);
    }

    #[tokio::test]
    async fn test_future_height_rejected() {
        let h = harness();
        let err = h
            .node
            .chain_get_tip_set_after_height(&CallContext::new(), HEAD_HEIGHT + 1, &TipSetKey::EMPTY)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Freshness(FreshnessError::FutureHeight)
        ));
        assert_eq!(h.target.call_count("ChainGetTipSetAfterHeight"), 0);
    }

    #[tokio::test]
    async fn test_stale_height_rejected() {
        let h = harness();
        // 3000 epochs at 30s = 25h
        let err = h
            .node
            .chain_get_tip_set_by_height(&CallContext::new(), HEAD_HEIGHT - 3000, &TipSetKey::EMPTY)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad tipset height: lookbacks of more than 1day are disallowed"
        );
        assert_eq!(ApiError::from(err).code, -32602);
    }

    #[tokio::test]
    async fn test_path_endpoints_checked_independently() {
        let h = harness();
        let fresh = old_tipset(&h, "bafyfresh", HOUR);
        let stale = old_tipset(&h, "bafystale", 25 * HOUR);
        let ctx = CallContext::new();

        h.node.chain_get_path(&ctx, &fresh, &TipSetKey::EMPTY).await.unwrap();

        let err = h.node.chain_get_path(&ctx, &stale, &fresh).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("gateway: checking 'from' tipset: bad tipset:"));

        let err = h.node.chain_get_path(&ctx, &fresh, &stale).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("gateway: checking 'to' tipset: bad tipset:"));
        assert_eq!(h.target.call_count("ChainGetPath"), 1);
    }

    #[tokio::test]
    async fn test_unknown_tipset_error_passes_through() {
        let h = harness();
        let missing = TipSetKey::new(vec!["bafymissing".into()]);
        let err = h
            .node
            .chain_get_path(&CallContext::new(), &missing, &TipSetKey::EMPTY)
            .await
            .unwrap_err();
        let api = ApiError::from(err);
        assert_eq!(api.code, -32000);
        assert!(api.message.ends_with("blockstore: not found"));
    }

    #[tokio::test]
    async fn test_chain_notify_forwards_stream() {
        let h = harness();
        let mut rx = h.node.chain_notify(&CallContext::new()).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first[0].change, HeadChangeType::Current);
        assert_eq!(first[0].tipset.height(), HEAD_HEIGHT);
    }
}
