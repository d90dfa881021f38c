use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{AccountId, PermissionTier, TierTransition};

/// Audit events published by the gate. Hosts subscribe to persist or alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateEvent {
    // ── Tier lifecycle ─────────────────────────────────────────
    TierChanged {
        transition: TierTransition,
    },
    ManualOverride {
        transition: TierTransition,
    },

    // ── Decision outcomes ──────────────────────────────────────
    ForcedLiquidation {
        account_id: AccountId,
        symbol: String,
        trigger: String,
        previous_tier: PermissionTier,
        at: DateTime<Utc>,
    },
    ProposalRejected {
        account_id: AccountId,
        symbol: String,
        reason: String,
        tier: PermissionTier,
    },

    // ── Configuration ──────────────────────────────────────────
    CatalogReloaded {
        at: DateTime<Utc>,
    },
}

impl GateEvent {
    /// High-severity events must reach an operator, not just the audit log.
    pub fn is_high_severity(&self) -> bool {
        match self {
            Self::ForcedLiquidation { .. } | Self::ManualOverride { .. } => true,
            Self::TierChanged { transition } => transition.is_downgrade(),
            Self::ProposalRejected { .. } | Self::CatalogReloaded { .. } => false,
        }
    }
}

/// A broadcast-based event bus for audit fan-out.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<GateEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: GateEvent) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
