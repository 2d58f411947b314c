//! Model Context Protocol (MCP) session handling over a duplex channel
//!
//! Provides JSON-RPC envelopes, the outbound message sink, and the session that routes
//! inbound requests to the tool dispatcher.

pub mod rpc;
pub mod session;
pub mod transport;
