//! Outbound ports for the gateway.
//!
//! Everything the gateway calls into lives behind one of these traits: the
//! trusted node ([`TargetApi`]), the token verification service
//! ([`Verifier`]), local signature checking ([`SignatureVerifier`]) and the
//! wall clock ([`TimeSource`]).

use async_trait::async_trait;
use ethereum_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use shared_types::{
    Actor, Address, ApiVersion, BackendResult, BigInt, BlockHeader, BlockMessages, ChainEpoch,
    Cid, HeadChange, Message, MessageReceipt, MessageSendSpec, MsgLookup, NetworkVersion,
    ParentMessage, Signature, SignedMessage, TipSet, TipSetKey,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::domain::types::{
    ActorState, BitField, CirculatingSupply, DealCollateralBounds, Deadline, DeadlineInfo,
    EstimateMessage, EstimateResult, EthBlockParam, IpldObject, MarketBalance, MarketDeal,
    MinerInfo, MinerPower, MsigTransaction, MsigVesting, SectorOnChainInfo, StoragePower,
};

/// Tipset resolution, the part of the node the freshness checks need.
#[async_trait]
pub trait ChainResolver: Send + Sync {
    async fn chain_head(&self) -> BackendResult<TipSet>;
    async fn chain_get_tip_set(&self, tsk: &TipSetKey) -> BackendResult<TipSet>;
}

/// The trusted node behind the gateway.
///
/// Every method is remote and fallible; the gateway never retries.
#[async_trait]
pub trait TargetApi: ChainResolver {
    async fn version(&self) -> BackendResult<ApiVersion>;

    // --- Chain ---
    async fn chain_get_block(&self, cid: &Cid) -> BackendResult<BlockHeader>;
    async fn chain_get_block_messages(&self, cid: &Cid) -> BackendResult<BlockMessages>;
    async fn chain_get_message(&self, cid: &Cid) -> BackendResult<Message>;
    async fn chain_get_parent_messages(&self, cid: &Cid) -> BackendResult<Vec<ParentMessage>>;
    async fn chain_get_parent_receipts(&self, cid: &Cid) -> BackendResult<Vec<MessageReceipt>>;
    async fn chain_has_obj(&self, cid: &Cid) -> BackendResult<bool>;
    async fn chain_read_obj(&self, cid: &Cid) -> BackendResult<Vec<u8>>;
    async fn chain_get_node(&self, path: &str) -> BackendResult<IpldObject>;
    async fn chain_get_genesis(&self) -> BackendResult<TipSet>;
    async fn chain_get_tip_set_by_height(
        &self,
        height: ChainEpoch,
        tsk: &TipSetKey,
    ) -> BackendResult<TipSet>;
    async fn chain_get_tip_set_after_height(
        &self,
        height: ChainEpoch,
        tsk: &TipSetKey,
    ) -> BackendResult<TipSet>;
    async fn chain_get_path(
        &self,
        from: &TipSetKey,
        to: &TipSetKey,
    ) -> BackendResult<Vec<HeadChange>>;
    async fn chain_notify(&self) -> BackendResult<mpsc::Receiver<Vec<HeadChange>>>;

    // --- Gas & message pool ---
    async fn gas_estimate_message_gas(
        &self,
        msg: &Message,
        spec: Option<&MessageSendSpec>,
        tsk: &TipSetKey,
    ) -> BackendResult<Message>;
    async fn gas_batch_estimate_message_gas(
        &self,
        messages: &[EstimateMessage],
        from_nonce: u64,
        tsk: &TipSetKey,
    ) -> BackendResult<Vec<EstimateResult>>;
    async fn mpool_push_untrusted(&self, msg: &SignedMessage) -> BackendResult<Cid>;
    async fn mpool_get_nonce(&self, addr: &Address) -> BackendResult<u64>;

    // --- Multisig ---
    async fn msig_get_available_balance(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<BigInt>;
    async fn msig_get_vested(
        &self,
        addr: &Address,
        start: &TipSetKey,
        end: &TipSetKey,
    ) -> BackendResult<BigInt>;
    async fn msig_get_vesting_schedule(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<MsigVesting>;
    async fn msig_get_pending(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<Vec<MsigTransaction>>;

    // --- State ---
    async fn state_account_key(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<Address>;
    async fn state_deal_provider_collateral_bounds(
        &self,
        size: u64,
        verified: bool,
        tsk: &TipSetKey,
    ) -> BackendResult<DealCollateralBounds>;
    async fn state_get_actor(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<Actor>;
    async fn state_list_miners(&self, tsk: &TipSetKey) -> BackendResult<Vec<Address>>;
    async fn state_lookup_id(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<Address>;
    async fn state_market_balance(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<MarketBalance>;
    async fn state_market_storage_deal(
        &self,
        deal_id: u64,
        tsk: &TipSetKey,
    ) -> BackendResult<MarketDeal>;
    async fn state_network_name(&self) -> BackendResult<String>;
    async fn state_network_version(&self, tsk: &TipSetKey) -> BackendResult<NetworkVersion>;
    async fn state_search_msg(
        &self,
        from: &TipSetKey,
        msg: &Cid,
        limit: ChainEpoch,
        allow_replaced: bool,
    ) -> BackendResult<Option<MsgLookup>>;
    async fn state_wait_msg(
        &self,
        msg: &Cid,
        confidence: u64,
        limit: ChainEpoch,
        allow_replaced: bool,
    ) -> BackendResult<MsgLookup>;
    async fn state_read_state(&self, addr: &Address, tsk: &TipSetKey)
        -> BackendResult<ActorState>;
    async fn state_miner_power(&self, addr: &Address, tsk: &TipSetKey)
        -> BackendResult<MinerPower>;
    async fn state_miner_faults(&self, addr: &Address, tsk: &TipSetKey)
        -> BackendResult<BitField>;
    async fn state_miner_recoveries(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<BitField>;
    async fn state_miner_info(&self, addr: &Address, tsk: &TipSetKey) -> BackendResult<MinerInfo>;
    async fn state_miner_deadlines(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<Vec<Deadline>>;
    async fn state_miner_available_balance(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<BigInt>;
    async fn state_miner_proving_deadline(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<DeadlineInfo>;
    async fn state_circulating_supply(&self, tsk: &TipSetKey) -> BackendResult<BigInt>;
    async fn state_sector_get_info(
        &self,
        addr: &Address,
        sector: u64,
        tsk: &TipSetKey,
    ) -> BackendResult<Option<SectorOnChainInfo>>;
    async fn state_verified_client_status(
        &self,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> BackendResult<Option<StoragePower>>;
    async fn state_vm_circulating_supply_internal(
        &self,
        tsk: &TipSetKey,
    ) -> BackendResult<CirculatingSupply>;

    // --- Wallet ---
    async fn wallet_balance(&self, addr: &Address) -> BackendResult<BigInt>;

    // --- Ethereum compatibility ---
    async fn eth_chain_id(&self) -> BackendResult<u64>;
    async fn eth_block_number(&self) -> BackendResult<u64>;
    async fn eth_get_balance(&self, addr: &H160, block: &EthBlockParam) -> BackendResult<U256>;
    async fn eth_send_raw_transaction(&self, raw: &[u8]) -> BackendResult<H256>;
}

/// Successful token verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Account the token was issued to
    pub name: String,
    /// Granted permission level
    pub perm: String,
    #[serde(default)]
    pub extra: String,
}

/// Token verification failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The service rejected the token
    #[error("response code is : {status}, msg:{body}")]
    Rejected { status: u16, body: String },

    /// The service could not be reached or answered garbage
    #[error("verify request failed: {0}")]
    Transport(String),
}

/// Request metadata forwarded to the verification service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyRequest {
    /// Trace span of the incoming request
    pub span_id: String,
    /// Name of this service
    pub service_name: String,
    /// Remote address of the caller
    pub pre_host: String,
    /// Host the caller addressed
    pub host: String,
}

/// Resolves a bearer token to a permission level.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest, token: &str) -> Result<VerifyResponse, AuthError>;
}

/// Signature check failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("unsupported signature type: {0:?}")]
    UnsupportedType(shared_types::SigType),
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("signature does not match signer {0}")]
    Mismatch(Address),
}

/// Local signature verification.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signature: &Signature, signer: &Address, data: &[u8]) -> Result<(), SignatureError>;
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Unix time in seconds
    fn now(&self) -> u64;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Manually driven clock
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
