//! `Discover`: a static OpenRPC-style description of the gateway surface.

use serde_json::{json, Value};
use std::sync::LazyLock;
use tracing::instrument;

use super::GatewayNode;
use crate::domain::context::CallContext;
use crate::domain::error::GatewayResult;
use crate::domain::methods::{Freshness, OperationClass, METHOD_REGISTRY, RPC_NAMESPACE};
use crate::VERSION;

fn class_name(class: OperationClass) -> &'static str {
    match class {
        OperationClass::Basic => "basic",
        OperationClass::Wallet => "wallet",
        OperationClass::Chain => "chain",
        OperationClass::State => "state",
        OperationClass::Free => "free",
    }
}

fn freshness_name(freshness: Freshness) -> &'static str {
    match freshness {
        Freshness::None => "none",
        Freshness::TipSet => "tipset",
        Freshness::TipSetPair => "tipset-pair",
        Freshness::Height => "height",
        Freshness::EthBlock => "eth-block",
    }
}

static DOCUMENT: LazyLock<Value> = LazyLock::new(|| {
    let mut methods: Vec<_> = METHOD_REGISTRY.values().collect();
    methods.sort_unstable_by_key(|m| m.name);

    let methods: Vec<Value> = methods
        .into_iter()
        .map(|m| {
            json!({
                "name": format!("{RPC_NAMESPACE}.{}", m.name),
                "x-supported": m.supported,
                "x-permission": m.permission.as_str(),
                "x-cost-class": class_name(m.class),
                "x-tokens": m.tokens(),
                "x-freshness": freshness_name(m.freshness),
            })
        })
        .collect();

    json!({
        "openrpc": "1.2.6",
        "info": {
            "title": "Chain Gateway",
            "version": VERSION,
        },
        "methods": methods,
    })
});

/// The document returned by `Discover`, built once.
pub fn discover_document() -> &'static Value {
    &DOCUMENT
}

impl GatewayNode {
    /// Served locally; costs no tokens.
    #[instrument(skip_all)]
    pub async fn discover(&self, ctx: &CallContext) -> GatewayResult<Value> {
        self.call(ctx, "Discover", async { Ok(discover_document().clone()) })
            .await
    }
}
