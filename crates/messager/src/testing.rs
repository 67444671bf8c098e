//! In-memory message service for tests.

use async_trait::async_trait;
use shared_types::{Address, BigInt, Message, MessageReceipt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::MessagerError;
use crate::ports::MessagerApi;
use crate::types::{MessageState, MsgDetail, MsgMeta};

/// A bare message detail in `state` with `confidence`.
pub fn detail(id: &str, state: MessageState, confidence: i64) -> MsgDetail {
    MsgDetail {
        id: id.to_string(),
        unsigned_cid: None,
        signed_cid: None,
        message: Message {
            version: 0,
            to: Address::from("f01"),
            from: Address::from("f1sender"),
            nonce: 0,
            value: BigInt::zero(),
            gas_limit: 0,
            gas_fee_cap: BigInt::zero(),
            gas_premium: BigInt::zero(),
            method: 0,
            params: Vec::new(),
        },
        signature: None,
        height: 0,
        confidence,
        receipt: None,
        tip_set_key: Default::default(),
        meta: None,
        wallet_name: String::new(),
        state,
    }
}

/// A failed detail whose receipt carries `reason`.
pub fn failed(id: &str, reason: &str) -> MsgDetail {
    let mut d = detail(id, MessageState::Failed, 0);
    d.receipt = Some(MessageReceipt {
        exit_code: 7,
        return_data: reason.as_bytes().to_vec(),
        gas_used: 0,
    });
    d
}

#[derive(Default)]
struct State {
    /// Per id, fetch results in order; the last one repeats.
    script: HashMap<String, VecDeque<Result<MsgDetail, MessagerError>>>,
    fetches: HashMap<String, usize>,
    wallets: HashSet<Address>,
    pushed: Vec<(String, Message)>,
}

/// Message service whose `get_message_by_uid` answers follow a script.
#[derive(Default)]
pub struct ScriptedMessager {
    state: Mutex<State>,
    fetch_delay: Mutex<Option<Duration>>,
}

impl ScriptedMessager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, id: &str, results: Vec<Result<MsgDetail, MessagerError>>) {
        self.state
            .lock()
            .unwrap()
            .script
            .insert(id.to_string(), results.into());
    }

    pub fn add_wallet(&self, addr: Address) {
        self.state.lock().unwrap().wallets.insert(addr);
    }

    /// Make every fetch take `delay` of (virtual) time.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn fetches(&self, id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetches
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    pub fn pushed(&self) -> Vec<(String, Message)> {
        self.state.lock().unwrap().pushed.clone()
    }
}

#[async_trait]
impl MessagerApi for ScriptedMessager {
    async fn wallet_has(&self, addr: &Address) -> Result<bool, MessagerError> {
        Ok(self.state.lock().unwrap().wallets.contains(addr))
    }

    async fn has_message_by_uid(&self, id: &str) -> Result<bool, MessagerError> {
        let state = self.state.lock().unwrap();
        Ok(state.script.contains_key(id) || state.pushed.iter().any(|(p, _)| p == id))
    }

    async fn push_message(&self, msg: &Message, meta: &MsgMeta) -> Result<String, MessagerError> {
        let id = format!("msg-{}", self.state.lock().unwrap().pushed.len() + 1);
        self.push_message_with_id(&id, msg, meta).await
    }

    async fn push_message_with_id(
        &self,
        id: &str,
        msg: &Message,
        _meta: &MsgMeta,
    ) -> Result<String, MessagerError> {
        self.state
            .lock()
            .unwrap()
            .pushed
            .push((id.to_string(), msg.clone()));
        Ok(id.to_string())
    }

    async fn get_message_by_uid(&self, id: &str) -> Result<MsgDetail, MessagerError> {
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        *state.fetches.entry(id.to_string()).or_default() += 1;
        let Some(queue) = state.script.get_mut(id) else {
            return Err(MessagerError::Rpc {
                code: 1,
                message: format!("message {id} not found"),
            });
        };
        match queue.len() {
            0 => Err(MessagerError::Rpc {
                code: 1,
                message: format!("message {id} not found"),
            }),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or_else(|| {
                Err(MessagerError::Decode("script drained".into()))
            }),
        }
    }
}
