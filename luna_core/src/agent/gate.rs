//! Per-counterpart reaction gate.
//!
//! While a gate is engaged, inbound messages from that counterpart are dropped
//! outright. The gate is released when its [`GateGuard`] goes out of scope.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct ReactionGate {
    engaged: AtomicBool,
}

impl ReactionGate {
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    /// Engage the gate unless it is already engaged.
    pub fn try_engage(self: &Arc<Self>) -> Option<GateGuard> {
        self.engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self.clone() })
    }
}

#[derive(Debug)]
pub struct GateGuard {
    gate: Arc<ReactionGate>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.engaged.store(false, Ordering::Release);
    }
}

/// Lazily created gates, one per counterpart identity.
#[derive(Debug, Default)]
pub struct GateRegistry {
    gates: Mutex<HashMap<String, Arc<ReactionGate>>>,
}

impl GateRegistry {
    pub fn gate_for(&self, id: &str) -> Arc<ReactionGate> {
        let mut gates = self
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        gates
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(ReactionGate::default()))
            .clone()
    }
}
