//! Ethereum-compatible subset of the gateway.

use ethereum_types::{H160, H256, U256};
use shared_types::{ChainEpoch, TipSetKey};
use tracing::instrument;

use super::GatewayNode;
use crate::domain::context::CallContext;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::freshness::FreshnessError;
use crate::domain::types::EthBlockParam;

impl GatewayNode {
    #[instrument(skip_all)]
    pub async fn eth_chain_id(&self, ctx: &CallContext) -> GatewayResult<u64> {
        self.call(ctx, "EthChainId", async { Ok(self.target.eth_chain_id().await?) })
            .await
    }

    #[instrument(skip_all)]
    pub async fn eth_block_number(&self, ctx: &CallContext) -> GatewayResult<u64> {
        self.call(ctx, "EthBlockNumber", async {
            Ok(self.target.eth_block_number().await?)
        })
        .await
    }

    /// Balance at a block; numbered blocks are held to the lookback cap.
    #[instrument(skip(self, ctx), fields(addr = ?addr, block = %block))]
    pub async fn eth_get_balance(
        &self,
        ctx: &CallContext,
        addr: &H160,
        block: &EthBlockParam,
    ) -> GatewayResult<U256> {
        self.call(ctx, "EthGetBalance", async {
            self.check_eth_block(block).await?;
            Ok(self.target.eth_get_balance(addr, block).await?)
        })
        .await
    }

    /// Forward a signed raw transaction to the node's pool.
    #[instrument(skip_all, fields(len = raw.len()))]
    pub async fn eth_send_raw_transaction(&self, ctx: &CallContext, raw: &[u8]) -> GatewayResult<H256> {
        self.call(ctx, "EthSendRawTransaction", async {
            Ok(self.target.eth_send_raw_transaction(raw).await?)
        })
        .await
    }

    /// Tags and hashes pass; a block number is a height relative to head.
    async fn check_eth_block(&self, block: &EthBlockParam) -> Result<(), GatewayError> {
        match block {
            EthBlockParam::Number(n) => {
                let height = ChainEpoch::try_from(*n).map_err(|_| FreshnessError::FutureHeight)?;
                self.check_tipset_height(height, &TipSetKey::EMPTY).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
