//! State queries, gas estimation and message submission.

use shared_types::{
    Actor, Address, BigInt, ChainEpoch, Cid, Message, MessageSendSpec, MsgLookup, NetworkVersion,
    SignedMessage, TipSetKey,
};
use tracing::instrument;

use super::GatewayNode;
use crate::domain::context::CallContext;
use crate::domain::error::GatewayResult;
use crate::domain::types::{
    ActorState, BitField, CirculatingSupply, DealCollateralBounds, Deadline, DeadlineInfo,
    EstimateMessage, EstimateResult, MarketBalance, MarketDeal, MinerInfo, MinerPower,
    SectorOnChainInfo, StoragePower,
};

/// State query taking an address and a tipset key: validate the key, then
/// forward.
macro_rules! addr_at_tipset {
    ($(#[$doc:meta])* $name:ident, $method:literal, $ret:ty) => {
        $(#[$doc])*
        #[instrument(skip(self, ctx), fields(addr = %addr, tsk = %tsk))]
        pub async fn $name(
            &self,
            ctx: &CallContext,
            addr: &Address,
            tsk: &TipSetKey,
        ) -> GatewayResult<$ret> {
            self.call(ctx, $method, async {
                self.check_tipset_key(tsk).await?;
                Ok(self.target.$name(addr, tsk).await?)
            })
            .await
        }
    };
}

impl GatewayNode {
    #[instrument(skip(self, ctx, msg, spec), fields(tsk = %tsk))]
    pub async fn gas_estimate_message_gas(
        &self,
        ctx: &CallContext,
        msg: &Message,
        spec: Option<&MessageSendSpec>,
        tsk: &TipSetKey,
    ) -> GatewayResult<Message> {
        self.call(ctx, "GasEstimateMessageGas", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.gas_estimate_message_gas(msg, spec, tsk).await?)
        })
        .await
    }

    /// One admission charge for the whole batch.
    #[instrument(skip(self, ctx, messages), fields(count = messages.len(), tsk = %tsk))]
    pub async fn gas_batch_estimate_message_gas(
        &self,
        ctx: &CallContext,
        messages: &[EstimateMessage],
        from_nonce: u64,
        tsk: &TipSetKey,
    ) -> GatewayResult<Vec<EstimateResult>> {
        self.call(ctx, "GasBatchEstimateMessageGas", async {
            self.check_tipset_key(tsk).await?;
            Ok(self
                .target
                .gas_batch_estimate_message_gas(messages, from_nonce, tsk)
                .await?)
        })
        .await
    }

    /// Submit a signed message through the node's untrusted path.
    ///
    /// The node applies its own admission rules to untrusted messages;
    /// gateway-side anti-spam checks would go here.
    #[instrument(skip_all, fields(from = %msg.message.from, nonce = msg.message.nonce))]
    pub async fn mpool_push(&self, ctx: &CallContext, msg: &SignedMessage) -> GatewayResult<Cid> {
        self.call(ctx, "MpoolPush", async {
            Ok(self.target.mpool_push_untrusted(msg).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(addr = %addr))]
    pub async fn mpool_get_nonce(&self, ctx: &CallContext, addr: &Address) -> GatewayResult<u64> {
        self.call(ctx, "MpoolGetNonce", async {
            Ok(self.target.mpool_get_nonce(addr).await?)
        })
        .await
    }

    addr_at_tipset!(state_account_key, "StateAccountKey", Address);

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn state_deal_provider_collateral_bounds(
        &self,
        ctx: &CallContext,
        size: u64,
        verified: bool,
        tsk: &TipSetKey,
    ) -> GatewayResult<DealCollateralBounds> {
        self.call(ctx, "StateDealProviderCollateralBounds", async {
            self.check_tipset_key(tsk).await?;
            Ok(self
                .target
                .state_deal_provider_collateral_bounds(size, verified, tsk)
                .await?)
        })
        .await
    }

    addr_at_tipset!(state_get_actor, "StateGetActor", Actor);

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn state_list_miners(&self, ctx: &CallContext, tsk: &TipSetKey) -> GatewayResult<Vec<Address>> {
        self.call(ctx, "StateListMiners", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.state_list_miners(tsk).await?)
        })
        .await
    }

    addr_at_tipset!(state_lookup_id, "StateLookupID", Address);
    addr_at_tipset!(state_market_balance, "StateMarketBalance", MarketBalance);

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn state_market_storage_deal(
        &self,
        ctx: &CallContext,
        deal_id: u64,
        tsk: &TipSetKey,
    ) -> GatewayResult<MarketDeal> {
        self.call(ctx, "StateMarketStorageDeal", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.state_market_storage_deal(deal_id, tsk).await?)
        })
        .await
    }

    #[instrument(skip_all)]
    pub async fn state_network_name(&self, ctx: &CallContext) -> GatewayResult<String> {
        self.call(ctx, "StateNetworkName", async {
            Ok(self.target.state_network_name().await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn state_network_version(
        &self,
        ctx: &CallContext,
        tsk: &TipSetKey,
    ) -> GatewayResult<NetworkVersion> {
        self.call(ctx, "StateNetworkVersion", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.state_network_version(tsk).await?)
        })
        .await
    }

    /// Search for a message, with the lookback capped at the configured
    /// limit.
    #[instrument(skip(self, ctx), fields(from = %from, msg = %msg))]
    pub async fn state_search_msg(
        &self,
        ctx: &CallContext,
        from: &TipSetKey,
        msg: &Cid,
        limit: ChainEpoch,
        allow_replaced: bool,
    ) -> GatewayResult<Option<MsgLookup>> {
        self.call(ctx, "StateSearchMsg", async {
            let limit = self.clamp_lookback(limit);
            self.check_tipset_key(from).await?;
            Ok(self
                .target
                .state_search_msg(from, msg, limit, allow_replaced)
                .await?)
        })
        .await
    }

    /// Wait for a message, with the lookback capped at the configured limit.
    #[instrument(skip(self, ctx), fields(msg = %msg))]
    pub async fn state_wait_msg(
        &self,
        ctx: &CallContext,
        msg: &Cid,
        confidence: u64,
        limit: ChainEpoch,
        allow_replaced: bool,
    ) -> GatewayResult<MsgLookup> {
        self.call(ctx, "StateWaitMsg", async {
            let limit = self.clamp_lookback(limit);
            Ok(self
                .target
                .state_wait_msg(msg, confidence, limit, allow_replaced)
                .await?)
        })
        .await
    }

    addr_at_tipset!(state_read_state, "StateReadState", ActorState);
    addr_at_tipset!(state_miner_power, "StateMinerPower", MinerPower);
    addr_at_tipset!(state_miner_faults, "StateMinerFaults", BitField);
    addr_at_tipset!(state_miner_recoveries, "StateMinerRecoveries", BitField);
    addr_at_tipset!(state_miner_info, "StateMinerInfo", MinerInfo);
    addr_at_tipset!(state_miner_deadlines, "StateMinerDeadlines", Vec<Deadline>);
    addr_at_tipset!(state_miner_available_balance, "StateMinerAvailableBalance", BigInt);
    addr_at_tipset!(state_miner_proving_deadline, "StateMinerProvingDeadline", DeadlineInfo);

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn state_circulating_supply(&self, ctx: &CallContext, tsk: &TipSetKey) -> GatewayResult<BigInt> {
        self.call(ctx, "StateCirculatingSupply", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.state_circulating_supply(tsk).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(addr = %addr, tsk = %tsk))]
    pub async fn state_sector_get_info(
        &self,
        ctx: &CallContext,
        addr: &Address,
        sector: u64,
        tsk: &TipSetKey,
    ) -> GatewayResult<Option<SectorOnChainInfo>> {
        self.call(ctx, "StateSectorGetInfo", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.state_sector_get_info(addr, sector, tsk).await?)
        })
        .await
    }

    addr_at_tipset!(
        state_verified_client_status,
        "StateVerifiedClientStatus",
        Option<StoragePower>
    );

    #[instrument(skip(self, ctx), fields(tsk = %tsk))]
    pub async fn state_vm_circulating_supply_internal(
        &self,
        ctx: &CallContext,
        tsk: &TipSetKey,
    ) -> GatewayResult<CirculatingSupply> {
        self.call(ctx, "StateVMCirculatingSupplyInternal", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.state_vm_circulating_supply_internal(tsk).await?)
        })
        .await
    }
}
