//! Cross-process propagation of the active xid.
//!
//! The xid travels as a single opaque string under [`XID_HEADER`] in the
//! outbound call's metadata. A missing or empty header means the callee has
//! no global transaction. A callee that receives an xid joins it as a
//! participant; it never inherits the caller's deadline or suspended
//! transactions.

use std::collections::{BTreeMap, HashMap};

use crate::transaction::context::TransactionContext;
use crate::transaction::error::TransactionResult;
use crate::transaction::types::Xid;

/// Metadata key carrying the xid.
pub const XID_HEADER: &str = "TX_XID";

/// String metadata attached to an outbound or inbound call.
pub trait Carrier {
    fn get(&self, key: &str) -> Option<&str>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

impl Carrier for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        HashMap::remove(self, key);
    }
}

impl Carrier for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        BTreeMap::remove(self, key);
    }
}

impl TransactionContext {
    /// The token to attach to an outbound call, if a transaction is active.
    pub fn to_token(&self) -> Option<String> {
        self.xid().map(|xid| xid.to_string())
    }

    /// Rebuild a callee context from a received token.
    pub fn from_token(token: Option<&str>) -> TransactionResult<Self> {
        match token.map(str::trim) {
            None | Some("") => Ok(Self::new()),
            Some(token) => Ok(Self::from_xid(Xid::new(token)?)),
        }
    }
}

/// Write the active xid into `carrier`, clearing any stale value.
///
/// Returns whether an xid was written.
pub fn inject<C: Carrier + ?Sized>(ctx: &TransactionContext, carrier: &mut C) -> bool {
    match ctx.to_token() {
        Some(token) => {
            carrier.set(XID_HEADER, token);
            true
        }
        None => {
            carrier.remove(XID_HEADER);
            false
        }
    }
}

/// Build the callee's context from received metadata.
pub fn extract<C: Carrier + ?Sized>(carrier: &C) -> TransactionResult<TransactionContext> {
    TransactionContext::from_token(carrier.get(XID_HEADER))
}
