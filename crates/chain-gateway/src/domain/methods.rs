//! Method registry: admission cost, required permission and freshness
//! checks of every operation the gateway exposes.
//!
//! Cost classes:
//! - Basic (1 token): node metadata
//! - Wallet (1 token): multisig balance queries
//! - Chain (2 tokens): chain reads
//! - State (3 tokens): state queries, gas estimation, message submission

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::domain::permission::Permission;

/// JSON-RPC namespace the methods are served under.
pub const RPC_NAMESPACE: &str = "Filecoin";

/// Admission cost class of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Node metadata
    Basic,
    /// Multisig/wallet balance queries
    Wallet,
    /// Chain reads
    Chain,
    /// State reads and message submission
    State,
    /// Served locally without touching the limiter
    Free,
}

impl OperationClass {
    /// Token cost charged against the admission buckets.
    pub const fn tokens(self) -> u32 {
        match self {
            OperationClass::Basic => 1,
            OperationClass::Wallet => 1,
            OperationClass::Chain => 2,
            OperationClass::State => 3,
            OperationClass::Free => 0,
        }
    }

    /// Largest cost of any class; the bucket burst must be at least this.
    pub const fn max_cost() -> u32 {
        OperationClass::State.tokens()
    }
}

/// Chain freshness validation applied before forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
    /// Reads live state only
    None,
    /// One tipset key parameter
    TipSet,
    /// Two tipset key parameters (range or vesting window)
    TipSetPair,
    /// A height relative to a tipset key (empty key = head)
    Height,
    /// An Ethereum block number-or-hash parameter
    EthBlock,
}

/// Method metadata
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Method name without namespace (e.g., "ChainHead")
    pub name: &'static str,
    /// Admission cost class
    pub class: OperationClass,
    /// Permission a caller must hold
    pub permission: Permission,
    /// Freshness checks applied to parameters
    pub freshness: Freshness,
    /// Whether the gateway serves the method at all
    pub supported: bool,
}

impl MethodInfo {
    const fn read(name: &'static str, class: OperationClass, freshness: Freshness) -> Self {
        Self {
            name,
            class,
            permission: Permission::Read,
            freshness,
            supported: true,
        }
    }

    const fn write(name: &'static str, class: OperationClass, freshness: Freshness) -> Self {
        Self {
            name,
            class,
            permission: Permission::Write,
            freshness,
            supported: true,
        }
    }

    const fn unsupported(name: &'static str) -> Self {
        Self {
            name,
            class: OperationClass::Free,
            permission: Permission::Write,
            freshness: Freshness::None,
            supported: false,
        }
    }

    /// Token cost of one call.
    pub fn tokens(&self) -> u32 {
        self.class.tokens()
    }
}

/// Every method the gateway knows, keyed by bare name.
pub static METHOD_REGISTRY: LazyLock<HashMap<&'static str, MethodInfo>> = LazyLock::new(|| {
    use Freshness as F;
    use OperationClass as C;

    let methods = [
        // --- Local ---
        MethodInfo::read("Discover", C::Free, F::None),
        MethodInfo::unsupported("ChainPutObj"),
        // --- Basic ---
        MethodInfo::read("Version", C::Basic, F::None),
        // --- Chain ---
        MethodInfo::read("ChainHead", C::Chain, F::None),
        MethodInfo::read("ChainGetBlock", C::Chain, F::None),
        MethodInfo::read("ChainGetBlockMessages", C::Chain, F::None),
        MethodInfo::read("ChainGetMessage", C::Chain, F::None),
        MethodInfo::read("ChainGetParentMessages", C::Chain, F::None),
        MethodInfo::read("ChainGetParentReceipts", C::Chain, F::None),
        MethodInfo::read("ChainHasObj", C::Chain, F::None),
        MethodInfo::read("ChainReadObj", C::Chain, F::None),
        MethodInfo::read("ChainGetNode", C::Chain, F::None),
        MethodInfo::read("ChainGetGenesis", C::Chain, F::None),
        MethodInfo::read("ChainGetTipSet", C::Chain, F::None),
        MethodInfo::read("ChainGetTipSetByHeight", C::Chain, F::Height),
        MethodInfo::read("ChainGetTipSetAfterHeight", C::Chain, F::Height),
        MethodInfo::read("ChainGetPath", C::Chain, F::TipSetPair),
        MethodInfo::read("ChainNotify", C::Chain, F::None),
        MethodInfo::read("EthChainId", C::Chain, F::None),
        MethodInfo::read("EthBlockNumber", C::Chain, F::None),
        MethodInfo::read("EthGetBalance", C::Chain, F::EthBlock),
        // --- Wallet ---
        MethodInfo::read("MsigGetAvailableBalance", C::Wallet, F::TipSet),
        MethodInfo::read("MsigGetVested", C::Wallet, F::TipSetPair),
        MethodInfo::read("MsigGetVestingSchedule", C::Wallet, F::TipSet),
        MethodInfo::read("MsigGetPending", C::Wallet, F::TipSet),
        // --- State ---
        MethodInfo::read("GasEstimateMessageGas", C::State, F::TipSet),
        MethodInfo::read("GasBatchEstimateMessageGas", C::State, F::TipSet),
        MethodInfo::write("MpoolPush", C::State, F::None),
        MethodInfo::read("MpoolGetNonce", C::State, F::None),
        MethodInfo::read("StateAccountKey", C::State, F::TipSet),
        MethodInfo::read("StateDealProviderCollateralBounds", C::State, F::TipSet),
        MethodInfo::read("StateGetActor", C::State, F::TipSet),
        MethodInfo::read("StateListMiners", C::State, F::TipSet),
        MethodInfo::read("StateLookupID", C::State, F::TipSet),
        MethodInfo::read("StateMarketBalance", C::State, F::TipSet),
        MethodInfo::read("StateMarketStorageDeal", C::State, F::TipSet),
        MethodInfo::read("StateNetworkName", C::State, F::None),
        MethodInfo::read("StateNetworkVersion", C::State, F::TipSet),
        MethodInfo::read("StateSearchMsg", C::State, F::TipSet),
        MethodInfo::read("StateWaitMsg", C::State, F::None),
        MethodInfo::read("StateReadState", C::State, F::TipSet),
        MethodInfo::read("StateMinerPower", C::State, F::TipSet),
        MethodInfo::read("StateMinerFaults", C::State, F::TipSet),
        MethodInfo::read("StateMinerRecoveries", C::State, F::TipSet),
        MethodInfo::read("StateMinerInfo", C::State, F::TipSet),
        MethodInfo::read("StateMinerDeadlines", C::State, F::TipSet),
        MethodInfo::read("StateMinerAvailableBalance", C::State, F::TipSet),
        MethodInfo::read("StateMinerProvingDeadline", C::State, F::TipSet),
        MethodInfo::read("StateCirculatingSupply", C::State, F::TipSet),
        MethodInfo::read("StateSectorGetInfo", C::State, F::TipSet),
        MethodInfo::read("StateVerifiedClientStatus", C::State, F::TipSet),
        MethodInfo::read("StateVMCirculatingSupplyInternal", C::State, F::TipSet),
        MethodInfo::read("WalletBalance", C::State, F::None),
        MethodInfo::read("WalletVerify", C::State, F::None),
        MethodInfo::write("EthSendRawTransaction", C::State, F::None),
    ];

    methods.into_iter().map(|m| (m.name, m)).collect()
});

/// Strip the `Filecoin.` namespace if present.
pub fn bare_method_name(method: &str) -> &str {
    method
        .strip_prefix(RPC_NAMESPACE)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(method)
}

/// Get method info, with or without namespace
pub fn get_method_info(method: &str) -> Option<&'static MethodInfo> {
    METHOD_REGISTRY.get(bare_method_name(method))
}

/// Check if method is served by the gateway
pub fn is_method_supported(method: &str) -> bool {
    get_method_info(method).is_some_and(|m| m.supported)
}

/// Permission required to call a method; unknown methods require admin
pub fn required_permission(method: &str) -> Permission {
    get_method_info(method)
        .map(|m| m.permission)
        .unwrap_or(Permission::Admin)
}

/// Get all methods of one cost class
pub fn get_methods_by_class(class: OperationClass) -> Vec<&'static str> {
    let mut names: Vec<_> = METHOD_REGISTRY
        .values()
        .filter(|m| m.class == class)
        .map(|m| m.name)
        .collect();
    names.sort_unstable();
    names
}
