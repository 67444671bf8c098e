//! Multisig and wallet operations.

use shared_types::{Address, BigInt, Signature, TipSetKey};
use tracing::{debug, instrument};

use super::GatewayNode;
use crate::domain::context::CallContext;
use crate::domain::error::GatewayResult;
use crate::domain::types::{MsigTransaction, MsigVesting};

/// ID addresses (`f0…`/`t0…`) name an actor, not a key.
fn is_id_address(addr: &Address) -> bool {
    let s = addr.as_str();
    s.len() > 2 && (s.starts_with("f0") || s.starts_with("t0"))
}

impl GatewayNode {
    #[instrument(skip(self, ctx), fields(addr = %addr, tsk = %tsk))]
    pub async fn msig_get_available_balance(
        &self,
        ctx: &CallContext,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> GatewayResult<BigInt> {
        self.call(ctx, "MsigGetAvailableBalance", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.msig_get_available_balance(addr, tsk).await?)
        })
        .await
    }

    /// Vested amount between two tipsets; both must be fresh.
    #[instrument(skip(self, ctx), fields(addr = %addr, start = %start, end = %end))]
    pub async fn msig_get_vested(
        &self,
        ctx: &CallContext,
        addr: &Address,
        start: &TipSetKey,
        end: &TipSetKey,
    ) -> GatewayResult<BigInt> {
        self.call(ctx, "MsigGetVested", async {
            self.check_tipset_key(start).await?;
            self.check_tipset_key(end).await?;
            Ok(self.target.msig_get_vested(addr, start, end).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(addr = %addr, tsk = %tsk))]
    pub async fn msig_get_vesting_schedule(
        &self,
        ctx: &CallContext,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> GatewayResult<MsigVesting> {
        self.call(ctx, "MsigGetVestingSchedule", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.msig_get_vesting_schedule(addr, tsk).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(addr = %addr, tsk = %tsk))]
    pub async fn msig_get_pending(
        &self,
        ctx: &CallContext,
        addr: &Address,
        tsk: &TipSetKey,
    ) -> GatewayResult<Vec<MsigTransaction>> {
        self.call(ctx, "MsigGetPending", async {
            self.check_tipset_key(tsk).await?;
            Ok(self.target.msig_get_pending(addr, tsk).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(addr = %addr))]
    pub async fn wallet_balance(&self, ctx: &CallContext, addr: &Address) -> GatewayResult<BigInt> {
        self.call(ctx, "WalletBalance", async {
            Ok(self.target.wallet_balance(addr).await?)
        })
        .await
    }

    /// Check `signature` over `data` locally.
    ///
    /// An ID address is first resolved to its key at the head. A signature
    /// that does not verify yields `Ok(false)`; only admission, cancellation
    /// and resolution failures are errors.
    #[instrument(skip(self, ctx, data, signature), fields(signer = %signer))]
    pub async fn wallet_verify(
        &self,
        ctx: &CallContext,
        signer: &Address,
        data: &[u8],
        signature: &Signature,
    ) -> GatewayResult<bool> {
        self.call(ctx, "WalletVerify", async {
            let key = if is_id_address(signer) {
                self.target
                    .state_account_key(signer, &TipSetKey::EMPTY)
                    .await?
            } else {
                signer.clone()
            };

            match self.verifier.verify(signature, &key, data) {
                Ok(()) => Ok(true),
                Err(e) => {
                    debug!(error = %e, "Signature rejected");
                    Ok(false)
                }
            }
        })
        .await
    }
}
