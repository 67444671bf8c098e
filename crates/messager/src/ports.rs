//! The remote message service surface.

use async_trait::async_trait;
use shared_types::{Address, Message};

use crate::error::MessagerError;
use crate::types::{MsgDetail, MsgMeta};

#[async_trait]
pub trait MessagerApi: Send + Sync {
    async fn wallet_has(&self, addr: &Address) -> Result<bool, MessagerError>;

    async fn has_message_by_uid(&self, id: &str) -> Result<bool, MessagerError>;

    /// Queue `msg` for signing and sending; returns the service-assigned id.
    async fn push_message(&self, msg: &Message, meta: &MsgMeta) -> Result<String, MessagerError>;

    /// Like `push_message`, with a caller-chosen id.
    async fn push_message_with_id(
        &self,
        id: &str,
        msg: &Message,
        meta: &MsgMeta,
    ) -> Result<String, MessagerError>;

    async fn get_message_by_uid(&self, id: &str) -> Result<MsgDetail, MessagerError>;
}
