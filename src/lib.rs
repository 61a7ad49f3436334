//! tl1-link: a TL1 command/response server and client
//!
//! TL1 is a line-oriented protocol: the client sends
//! `VERB[-NOUN]:TID:AID:CTAG[:MOD1[:MOD2[:PARAMS]]];` and the server answers
//! with a multi-line block ending in a line holding only `;`.
//!
//! - [`protocol`]: command parsing and response formatting
//! - [`dispatch`]: verb to handler lookup
//! - [`session`]: per-connection state machine
//! - [`server`]: accept loop with a bounded number of sessions
//! - [`client`]: response framing and a simple client
//! - [`shell`]: interactive prompt and sample run

pub mod client;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod server;
pub mod session;
pub mod shell;
