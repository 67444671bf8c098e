//! Messager - client for the remote message service.
//!
//! Pushes messages for signing and sending, and waits for them to land with
//! a caller-chosen number of confirmations.
//!
//! ```ignore
//! use messager::{Messager, MessagerConfig};
//!
//! let messager = Messager::connect(&MessagerConfig::new(url, token))?;
//! let id = messager.push_message(&msg, &meta).await?;
//! let landed = messager.wait_message(&cancel, &id, 5).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
pub mod messager;
pub mod ports;
pub mod rpc_client;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{MessagerError, WaitError};
pub use messager::Messager;
pub use ports::MessagerApi;
pub use rpc_client::RpcMessagerClient;
pub use types::{MessageState, MessagerConfig, MsgDetail, MsgMeta};
