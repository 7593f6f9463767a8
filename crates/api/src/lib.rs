mod client;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
pub mod models;
mod remote;

pub use crate::client::Client;
#[cfg(feature = "mock")]
pub use crate::mock::{MOCK_ACCESS_TOKEN, MOCK_REFRESH_TOKEN, MockRemote};
pub use crate::remote::{Remote, Tokens};
use std::sync::Arc;

pub type RemoteHandle = Arc<dyn Remote>;
