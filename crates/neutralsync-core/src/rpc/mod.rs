//! Line-delimited JSON-RPC over TCP
//!
//! Both directions of executor/scheduler traffic use the same transport:
//! one newline-terminated JSON object per frame, one call per connection.

mod client;
mod message;
mod server;

pub use client::{RpcClient, RpcClientConfig};
pub use message::{
    optional_string_list, string_arg, string_list, RpcError, RpcRequest, RpcResponse,
    JSONRPC_VERSION, MAX_FRAME_LEN,
};
pub use server::{spawn, RequestHandler, ServerHandle, SESSION_IDLE_TIMEOUT};
