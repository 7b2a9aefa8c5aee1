pub mod conn;
pub mod error;
pub mod handlers;
pub mod header;
pub mod ie;
pub mod messages;
pub mod pool;
pub mod registry;
pub mod retry;
pub mod server;
pub mod teid_pool;
pub mod types;

pub use conn::{Conn, ConnConfig, ConnHandles, Handler, SessionEvent, UnhandledPolicy};
pub use error::{GtpError, Result};
pub use header::Header;
pub use ie::{BearerQos, Ie};
pub use pool::{LaneConfig, PoolConfig, PoolStats, Recycler};
pub use registry::{decode_message, encode_message, release_message, Body, Message};
pub use server::GtpcServer;
pub use types::*;
