//! # Node JSON-RPC Requests
//!
//! Builders for the handful of outbound requests the session writes. The
//! three subscription ids are fixed for the lifetime of the process so a
//! decoder can correlate responses across reconnects; heartbeat ids are drawn
//! from a range that never collides with them.

use std::ops::RangeInclusive;

use rand::Rng;
use serde::Serialize;

/// Request id of the one-shot runtime version query.
pub const RUNTIME_VERSION_ID: u32 = 1;
/// Request id of the new-head subscription.
pub const NEW_HEAD_ID: u32 = 2;
/// Request id of the finalized-head subscription.
pub const FINALIZED_HEAD_ID: u32 = 3;

/// Ids handed out to heartbeats: the 100 values directly above the fixed ids.
pub const HEARTBEAT_IDS: RangeInclusive<u32> = (FINALIZED_HEAD_ID + 1)..=(FINALIZED_HEAD_ID + 100);

/// A JSON-RPC 2.0 request with positional parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcRequest {
    /// Correlation id echoed back by the node.
    pub id: u32,
    /// RPC method name.
    pub method: &'static str,
    /// Positional parameters; every request here takes none.
    pub params: Vec<serde_json::Value>,
    /// Protocol marker, always `"2.0"`.
    pub jsonrpc: &'static str,
}

impl RpcRequest {
    fn new(id: u32, method: &'static str) -> Self {
        Self {
            id,
            method,
            params: Vec::new(),
            jsonrpc: "2.0",
        }
    }

    /// Serializes the request into the text frame written to the socket.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `chain_getRuntimeVersion` with the given id.
pub fn runtime_version(id: u32) -> RpcRequest {
    RpcRequest::new(id, "chain_getRuntimeVersion")
}

/// `chain_subscribeNewHead` with the given id.
pub fn subscribe_new_head(id: u32) -> RpcRequest {
    RpcRequest::new(id, "chain_subscribeNewHead")
}

/// `chain_subscribeFinalizedHeads` with the given id.
pub fn subscribe_finalized_heads(id: u32) -> RpcRequest {
    RpcRequest::new(id, "chain_subscribeFinalizedHeads")
}

/// `system_health` with the given id.
pub fn system_health(id: u32) -> RpcRequest {
    RpcRequest::new(id, "system_health")
}

/// The fixed requests issued after every (re)connect, in issue order:
/// version query, new-head subscription, finalized-head subscription.
pub fn subscription_plan() -> [RpcRequest; 3] {
    [
        runtime_version(RUNTIME_VERSION_ID),
        subscribe_new_head(NEW_HEAD_ID),
        subscribe_finalized_heads(FINALIZED_HEAD_ID),
    ]
}

/// Draws a fresh heartbeat id. Collisions between heartbeats are allowed.
pub fn heartbeat_id() -> u32 {
    rand::rng().random_range(HEARTBEAT_IDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_keeps_fixed_order_and_ids() {
        let plan = subscription_plan();
        let ids: Vec<u32> = plan.iter().map(|r| r.id).collect();
        let methods: Vec<&str> = plan.iter().map(|r| r.method).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(
            methods,
            vec![
                "chain_getRuntimeVersion",
                "chain_subscribeNewHead",
                "chain_subscribeFinalizedHeads"
            ]
        );
    }

    #[test]
    fn frame_is_a_json_rpc_request() {
        let frame = subscribe_new_head(NEW_HEAD_ID).to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": 2,
                "method": "chain_subscribeNewHead",
                "params": [],
                "jsonrpc": "2.0"
            })
        );
    }

    #[test]
    fn heartbeat_ids_never_collide_with_subscriptions() {
        for _ in 0..2_000 {
            let id = heartbeat_id();
            assert!(HEARTBEAT_IDS.contains(&id));
            assert!(![RUNTIME_VERSION_ID, NEW_HEAD_ID, FINALIZED_HEAD_ID].contains(&id));
        }
        assert_eq!(HEARTBEAT_IDS.clone().count(), 100);
    }
}
