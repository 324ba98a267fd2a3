//! JSON-RPC 2.0 client library.
//!
//! Both the decision endpoint and the chain node speak JSON-RPC over HTTP;
//! this crate carries the wire types and a small client with a per-request
//! timeout.
//!
//! # Example
//!
//! ```no_run
//! use rpc::HttpClient;
//!
//! # async fn example() -> rpc::Result<()> {
//! let node = HttpClient::new("http://127.0.0.1:8545");
//! let chain_id: String = node.request("eth_chainId", ()).await?;
//! println!("chain: {chain_id}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;

pub use client::{DEFAULT_TIMEOUT, HttpClient, MAX_RESPONSE_SIZE};
pub use error::{Error, Result};
pub use protocol::{JsonRpcError, Request, Response, VERSION};
