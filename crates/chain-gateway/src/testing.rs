//! In-memory backends for tests.
//!
//! [`StaticChain`] answers tipset lookups only; [`MockTarget`] implements the
//! whole [`TargetApi`] with canned answers, records every call it receives
//! and can be told to fail or stall individual methods.

use async_trait::async_trait;
use ethereum_types::{H160, H256, U256};
use shared_types::{
    Actor, Address, ApiVersion, BackendError, BackendResult, BigInt, BlockHeader, BlockMessages,
    ChainEpoch, Cid, HeadChange, HeadChangeType, Message, MessageReceipt, MessageSendSpec,
    MsgLookup, NetworkVersion, ParentMessage, SignedMessage, TipSet, TipSetKey,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::domain::types::{
    ActorState, BitField, CirculatingSupply, DealCollateralBounds, Deadline, DeadlineInfo,
    EstimateMessage, EstimateResult, EthBlockParam, IpldObject, MarketBalance, MarketDeal,
    MinerInfo, MinerPower, MsigTransaction, MsigVesting, SectorOnChainInfo, StoragePower,
};
use crate::ports::outbound::{ChainResolver, TargetApi};

/// Error code the mocks use for missing objects
pub const NOT_FOUND_CODE: i32 = -32000;

/// The error returned for tipsets the mock does not know
pub fn not_found() -> BackendError {
    BackendError::new(NOT_FOUND_CODE, "blockstore: not found")
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-block tipset at `height` produced at unix time `timestamp`.
pub fn tipset_at(cid: &str, height: ChainEpoch, timestamp: u64) -> TipSet {
    let block = BlockHeader {
        cid: Cid::from(cid),
        miner: Address::from("f01000"),
        height,
        timestamp,
        parents: vec![Cid::from(format!("{cid}-parent").as_str())],
        parent_state_root: Cid::from("bafystateroot"),
    };
    match TipSet::new(vec![block]) {
        Ok(ts) => ts,
        Err(_) => unreachable!("a single block always forms a tipset"),
    }
}

/// A plain value-transfer message.
pub fn sample_message(nonce: u64) -> Message {
    Message {
        version: 0,
        to: Address::from("f01234"),
        from: Address::from("f1sender"),
        nonce,
        value: U256::from(1_000u64),
        gas_limit: 0,
        gas_fee_cap: U256::zero(),
        gas_premium: U256::zero(),
        method: 0,
        params: Vec::new(),
    }
}

/// Chain resolver over a fixed set of tipsets.
#[derive(Debug, Default)]
pub struct StaticChain {
    head: Option<TipSet>,
    tipsets: HashMap<TipSetKey, TipSet>,
}

impl StaticChain {
    /// Resolver that knows no tipsets at all.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_head(head: TipSet) -> Self {
        let mut tipsets = HashMap::new();
        tipsets.insert(head.key().clone(), head.clone());
        Self {
            head: Some(head),
            tipsets,
        }
    }

    pub fn insert(mut self, ts: TipSet) -> Self {
        self.tipsets.insert(ts.key().clone(), ts);
        self
    }
}

#[async_trait]
impl ChainResolver for StaticChain {
    async fn chain_head(&self) -> BackendResult<TipSet> {
        self.head.clone().ok_or_else(not_found)
    }

    async fn chain_get_tip_set(&self, tsk: &TipSetKey) -> BackendResult<TipSet> {
        self.tipsets.get(tsk).cloned().ok_or_else(not_found)
    }
}

/// One call received by [`MockTarget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub args: String,
}

/// Scriptable in-memory node.
pub struct MockTarget {
    head: Mutex<TipSet>,
    tipsets: Mutex<HashMap<TipSetKey, TipSet>>,
    account_keys: Mutex<HashMap<Address, Address>>,
    failures: Mutex<HashMap<&'static str, BackendError>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<RecordedCall>>,
    block_delay_secs: u64,
}

impl MockTarget {
    /// Node whose head is `head`; every tipset below is derived from it at
    /// 30s per epoch.
    pub fn new(head: TipSet) -> Self {
        let mut tipsets = HashMap::new();
        tipsets.insert(head.key().clone(), head.clone());
        Self {
            head: Mutex::new(head),
            tipsets: Mutex::new(tipsets),
            account_keys: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            block_delay_secs: 30,
        }
    }

    /// Make `ts` resolvable by key.
    pub fn add_tipset(&self, ts: TipSet) {
        lock(&self.tipsets).insert(ts.key().clone(), ts);
    }

    pub fn set_head(&self, head: TipSet) {
        self.add_tipset(head.clone());
        *lock(&self.head) = head;
    }

    /// Map an ID address to its account key.
    pub fn set_account_key(&self, id: Address, key: Address) {
        lock(&self.account_keys).insert(id, key);
    }

    /// Make every call to `method` fail with `err`.
    pub fn fail(&self, method: &'static str, err: BackendError) {
        lock(&self.failures).insert(method, err);
    }

    /// Stall every call for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Names of the received calls, in order.
    pub fn methods(&self) -> Vec<&'static str> {
        lock(&self.calls).iter().map(|c| c.method).collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.method == method).count()
    }

    /// Arguments of the most recent call to `method`.
    pub fn last_args(&self, method: &str) -> Option<String> {
        lock(&self.calls)
            .iter()
            .rev()
            .find(|c| c.method == method)
            .map(|c| c.args.clone())
    }

    fn head(&self) -> TipSet {
        lock(&self.head).clone()
    }

    /// Tipset at `height` on the head's chain.
    fn derived(&self, height: ChainEpoch) -> TipSet {
        let head = self.head();
        let back = (head.height() - height).max(0) as u64;
        let ts = head
            .min_timestamp()
            .saturating_sub(back * self.block_delay_secs);
        tipset_at(&format!("bafyheight{height}"), height, ts)
    }

    async fn enter(&self, method: &'static str, args: String) -> BackendResult<()> {
        lock(&self.calls).push(RecordedCall { method, args });
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match lock(&self.failures).get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainResolver for MockTarget {
    async fn chain_head(&self) -> BackendResult<TipSet> {
        self.enter("ChainHead", String::new()).await?;
        Ok(self.head())
    }

    async fn chain_get_tip_set(&self, tsk: &TipSetKey) -> BackendResult<TipSet> {
        self.enter("ChainGetTipSet", tsk.to_string()).await?;
        if tsk.is_empty() {
            return Ok(self.head());
        }
        lock(&self.tipsets).get(tsk).cloned().ok_or_else(not_found)
    }
}

#[async_trait]
impl TargetApi for MockTarget {
    async fn version(&self) -> BackendResult<ApiVersion> {
        self.enter("Version", String::new()).await?;
        Ok(ApiVersion {
            version: "mock-node".into(),
            api_version: 0x0002_0000,
            block_delay: self.block_delay_secs,
        })
    }

    async fn chain_get_block(&self, cid: &Cid) -> BackendResult<BlockHeader> {
        self.enter("ChainGetBlock", cid.to_string()).await?;
        let mut block = self.head().blocks()[0].clone();
        block.cid = cid.clone();
        Ok(block)
    }

    async fn chain_get_block_messages(&self, cid: &Cid) -> BackendResult<BlockMessages> {
        self.enter("ChainGetBlockMessages", cid.to_string()).await?;
        Ok(BlockMessages::default())
    }

    async fn chain_get_message(&self, cid: &Cid) -> BackendResult<Message> {
        self.enter("ChainGetMessage", cid.to_string()).await?;
        Ok(sample_message(0))
    }

    async fn chain_get_parent_messages(&self, cid: &Cid) -> BackendResult<Vec<ParentMessage>> {
        self.enter("ChainGetParentMessages", cid.to_string()).await?;
        Ok(vec![ParentMessage {
            cid: Cid::from("bafymsg0"),
            message: sample_message(0),
        }])
    }

    async fn chain_get_parent_receipts(&self, cid: &Cid) -> BackendResult<Vec<MessageReceipt>> {
        self.enter("ChainGetParentReceipts", cid.to_string()).await?;
        Ok(vec![MessageReceipt::default()])
    }

    async fn chain_has_obj(&self, cid: &Cid) -> BackendResult<bool> {
        self.enter("ChainHasObj", cid.to_string()).await?;
        Ok(true)
    }

    async fn chain_read_obj(&self, cid: &Cid) -> BackendResult<Vec<u8>> {
        self.enter("ChainReadObj", cid.to_string()).await?;
        Ok(cid.as_str().as_bytes().to_vec())
    }

    async fn chain_get_node(&self, path: &str) -> BackendResult<IpldObject> {
        self.enter("ChainGetNode", path.to_string()).await?;
        Ok(serde_json::json!({ "Cid": path, "Obj": null }))
    }

    async fn chain_get_genesis(&self) -> BackendResult<TipSet> {
        self.enter("ChainGetGenesis", String::new()).await?;
        Ok(tipset_at("bafygenesis", 0, 0))
    }

    async fn chain_get_tip_set_by_height(
        &self,
        height: ChainEpoch,
        tsk: &TipSetKey,
    ) -> BackendResult<TipSet> {
        self.enter("ChainGetTipSetByHeight", format!("{height} {tsk}"))
            .await?;
        Ok(self.derived(height))
    }

    async fn chain_get_tip_set_after_height(
        &self,
        height: ChainEpoch,
        tsk: &TipSetKey,
    ) -> BackendResult<TipSet> {
        self.enter("ChainGetTipSetAfterHeight", format!("{height} {tsk}"))
            .await?;
        Ok(self.derived(height))
    }

    async fn chain_get_path(
        &self,
        from: &TipSetKey,
        to: &TipSetKey,
    ) -> BackendResult<Vec<HeadChange>> {
        self.enter("ChainGetPath", format!("{from} {to}")).await?;
        let target = lock(&self.tipsets).get(to).cloned().unwrap_or_else(|| self.head());
        Ok(vec![HeadChange {
            change: HeadChangeType::Apply,
            tipset: target,
        }])
    }

    async fn chain_notify(&self) -> BackendResult<mpsc::Receiver<Vec<HeadChange>>> {
        self.enter("ChainNotify", String::new()).await?;
        let (tx, rx) = mpsc::channel(1);
        let current = vec![HeadChange {
            change: HeadChangeType::Current,
            tipset: self.head(),
        }];
        // capacity 1 holds the first notification
        let _ = tx.try_send(current);
        Ok(rx)
    }

    async fn gas_estimate_message_gas(
        &self,
        msg: &Message,
        spec: Option<&MessageSendSpec>,
        tsk: &TipSetKey,
    ) -> BackendResult<Message> {
        self.enter(
            "GasEstimateMessageGas",
            format!("nonce={} spec={} {tsk}", msg.nonce, spec.is_some()),
        )
        .await?;
        let mut estimated = msg.clone();
        estimated.gas_limit = 1_000_000;
        estimated.gas_fee_cap = U256::from(100u64);
        estimated.gas_premium = U256::from(10u64);
        Ok(estimated)
    }

    async fn gas_batch_estimate_message_gas(
        &self,
        messages: &[EstimateMessage],
        from_nonce: u64,
        tsk: &TipSetKey,
    ) -> BackendResult<Vec<EstimateResult>> {
        self.enter(
            "GasBatchEstimateMessageGas",
            format!("n={} from_nonce={from_nonce} {tsk}", messages.len()),
        )
        .await?;
        Ok(messages
            .iter()
            .zip(from_nonce..)
            .map(|(m, nonce)| {
                let mut msg = m.msg.clone();
                msg.nonce = nonce;
                msg.gas_limit = 1_000_000;
                EstimateResult {
                    msg: Some(msg),
                    err: String::new(),
                }
            })
            .collect())
    }

    async fn mpool_push_untrusted(&self, msg: &SignedMessage) -> BackendResult<Cid> {
        self.enter("MpoolPushUntrusted", format!("nonce={}", msg.message.nonce))
            .await?;
        Ok(Cid::from(format!("bafymsg{}", msg.message.nonce).as_str()))
    }

    async fn mpool_get_nonce(&self, addr: &Address) -> BackendResult<u64> {
        self.enter("MpoolGetNonce", addr.to_string()).await?;
        Ok(7)
    }

    async fn msig_get_available_balance(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<BigInt> {
        self.enter("MsigGetAvailableBalance", format!("{addr} {tsk}"))
            .await?;
        Ok(U256::from(500u64))
    }

    async fn msig_get_vested(
        &self,
        addr: &Address,
        start: &TipSetKey,
        end: &TipSetKey,
    ) -> BackendResult<BigInt> {
        self.enter("MsigGetVested", format!("{addr} {start} {end}"))
            .await?;
        Ok(U256::from(250u64))
    }

    async fn msig_get_vesting_schedule(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<MsigVesting> {
        self.enter("MsigGetVestingSchedule", format!("{addr} {tsk}"))
            .await?;
        Ok(serde_json::json!({ "InitialBalance": "1000", "StartEpoch": 0, "UnlockDuration": 100 }))
    }

    async fn msig_get_pending(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<Vec<MsigTransaction>> {
        self.enter("MsigGetPending", format!("{addr} {tsk}")).await?;
        Ok(Vec::new())
    }

    async fn state_account_key(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<Address> {
        self.enter("StateAccountKey", format!("{addr} {tsk}")).await?;
        Ok(lock(&self.account_keys)
            .get(addr)
            .cloned()
            .unwrap_or_else(|| addr.clone()))
    }

    async fn state_deal_provider_collateral_bounds(
        &self,
        size: u64,
        verified: bool,
        tsk: &TipSetKey,
    ) -> BackendResult<DealCollateralBounds> {
        self.enter(
            "StateDealProviderCollateralBounds",
            format!("{size} {verified} {tsk}"),
        )
        .await?;
        Ok(DealCollateralBounds {
            min: U256::from(size),
            max: U256::from(size * 2),
        })
    }

    async fn state_get_actor(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<Actor> {
        self.enter("StateGetActor", format!("{addr} {tsk}")).await?;
        Ok(Actor {
            code: Cid::from("bafyaccountcode"),
            head: Cid::from("bafyactorhead"),
            nonce: 7,
            balance: U256::from(42u64),
        })
    }

    async fn state_list_miners(&self, tsk: &TipSetKey) -> BackendResult<Vec<Address>> {
        self.enter("StateListMiners", tsk.to_string()).await?;
        Ok(vec![Address::from("f01000"), Address::from("f01001")])
    }

    async fn state_lookup_id(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<Address> {
        self.enter("StateLookupID", format!("{addr} {tsk}")).await?;
        Ok(Address::from("f01234"))
    }

    async fn state_market_balance(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<MarketBalance> {
        self.enter("StateMarketBalance", format!("{addr} {tsk}")).await?;
        Ok(MarketBalance {
            escrow: U256::from(10u64),
            locked: U256::from(5u64),
        })
    }

    async fn state_market_storage_deal(
        &self,
        deal_id: u64,
        tsk: &TipSetKey,
    ) -> BackendResult<MarketDeal> {
        self.enter("StateMarketStorageDeal", format!("{deal_id} {tsk}"))
            .await?;
        Ok(serde_json::json!({ "Proposal": { "DealID": deal_id }, "State": {} }))
    }

    async fn state_network_name(&self) -> BackendResult<String> {
        self.enter("StateNetworkName", String::new()).await?;
        Ok("mocknet".into())
    }

    async fn state_network_version(&self, tsk: &TipSetKey) -> BackendResult<NetworkVersion> {
        self.enter("StateNetworkVersion", tsk.to_string()).await?;
        Ok(21)
    }

    async fn state_search_msg(
        &self,
        from: &TipSetKey,
        msg: &Cid,
        limit: ChainEpoch,
        allow_replaced: bool,
    ) -> BackendResult<Option<MsgLookup>> {
        self.enter(
            "StateSearchMsg",
            format!("{from} {msg} limit={limit} replaced={allow_replaced}"),
        )
        .await?;
        let head = self.head();
        Ok(Some(MsgLookup {
            message: msg.clone(),
            receipt: MessageReceipt::default(),
            tip_set: head.key().clone(),
            height: head.height(),
        }))
    }

    async fn state_wait_msg(
        &self,
        msg: &Cid,
        confidence: u64,
        limit: ChainEpoch,
        allow_replaced: bool,
    ) -> BackendResult<MsgLookup> {
        self.enter(
            "StateWaitMsg",
            format!("{msg} confidence={confidence} limit={limit} replaced={allow_replaced}"),
        )
        .await?;
        let head = self.head();
        Ok(MsgLookup {
            message: msg.clone(),
            receipt: MessageReceipt::default(),
            tip_set: head.key().clone(),
            height: head.height(),
        })
    }

    async fn state_read_state(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<ActorState> {
        self.enter("StateReadState", format!("{addr} {tsk}")).await?;
        Ok(ActorState {
            balance: U256::from(42u64),
            code: Cid::from("bafyaccountcode"),
            state: serde_json::json!({ "Address": addr.as_str() }),
        })
    }

    async fn state_miner_power(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<MinerPower> {
        self.enter("StateMinerPower", format!("{addr} {tsk}")).await?;
        Ok(serde_json::json!({ "MinerPower": { "RawBytePower": "1024" }, "HasMinPower": true }))
    }

    async fn state_miner_faults(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<BitField> {
        self.enter("StateMinerFaults", format!("{addr} {tsk}")).await?;
        Ok(vec![3, 5])
    }

    async fn state_miner_recoveries(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<BitField> {
        self.enter("StateMinerRecoveries", format!("{addr} {tsk}")).await?;
        Ok(vec![5])
    }

    async fn state_miner_info(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<MinerInfo> {
        self.enter("StateMinerInfo", format!("{addr} {tsk}")).await?;
        Ok(serde_json::json!({ "Owner": addr.as_str(), "SectorSize": 34359738368u64 }))
    }

    async fn state_miner_deadlines(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<Vec<Deadline>> {
        self.enter("StateMinerDeadlines", format!("{addr} {tsk}")).await?;
        Ok(vec![serde_json::json!({ "PostSubmissions": [] })])
    }

    async fn state_miner_available_balance(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<BigInt> {
        self.enter("StateMinerAvailableBalance", format!("{addr} {tsk}"))
            .await?;
        Ok(U256::from(77u64))
    }

    async fn state_miner_proving_deadline(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<DeadlineInfo> {
        self.enter("StateMinerProvingDeadline", format!("{addr} {tsk}"))
            .await?;
        Ok(serde_json::json!({ "Index": 0, "Open": self.head().height() }))
    }

    async fn state_circulating_supply(&self, tsk: &TipSetKey) -> BackendResult<BigInt> {
        self.enter("StateCirculatingSupply", tsk.to_string()).await?;
        Ok(U256::from(1_000_000u64))
    }

    async fn state_sector_get_info(
        &self,
        addr: &Address,
        sector: u64,
        tsk: &TipSetKey,
    ) -> BackendResult<Option<SectorOnChainInfo>> {
        self.enter("StateSectorGetInfo", format!("{addr} {sector} {tsk}"))
            .await?;
        Ok(Some(serde_json::json!({ "SectorNumber": sector })))
    }

    async fn state_verified_client_status(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<Option<StoragePower>> {
        self.enter("StateVerifiedClientStatus", format!("{addr} {tsk}"))
            .await?;
        Ok(None)
    }

    async fn state_vm_circulating_supply_internal(
        &self,
        tsk: &TipSetKey,
    ) -> BackendResult<CirculatingSupply> {
        self.enter("StateVMCirculatingSupplyInternal", tsk.to_string())
            .await?;
        Ok(serde_json::json!({ "FilCirculating": "1000000" }))
    }

    async fn wallet_balance(&self, addr: &Address) -> BackendResult<BigInt> {
        self.enter("WalletBalance", addr.to_string()).await?;
        Ok(U256::from(42u64))
    }

    async fn eth_chain_id(&self) -> BackendResult<u64> {
        self.enter("EthChainId", String::new()).await?;
        Ok(314)
    }

    async fn eth_block_number(&self) -> BackendResult<u64> {
        self.enter("EthBlockNumber", String::new()).await?;
        Ok(self.head().height().max(0) as u64)
    }

    async fn eth_get_balance(&self, addr: &H160, block: &EthBlockParam) -> BackendResult<U256> {
        self.enter("EthGetBalance", format!("{addr:?} {block}")).await?;
        Ok(U256::from(1u64))
    }

    async fn eth_send_raw_transaction(&self, raw: &[u8]) -> BackendResult<H256> {
        self.enter("EthSendRawTransaction", format!("len={}", raw.len()))
            .await?;
        Ok(H256::repeat_byte(0xab))
    }
}
