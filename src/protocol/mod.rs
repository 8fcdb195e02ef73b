//! Typed domain bindings
//!
//! Each domain is a set of free functions over any [`CdpConnection`], plus the
//! parameter, result and event types they exchange. Only a sample of domains is
//! bound here; anything else can go through [`call`] with a `serde_json::Value`.
//!
//! [`CdpConnection`]: crate::cdp::CdpConnection
//! [`call`]: crate::cdp::call

pub mod dom;
pub mod indexed_db;
