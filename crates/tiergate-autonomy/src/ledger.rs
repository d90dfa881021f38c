use chrono::{DateTime, Utc};
use tiergate_core::{
    AccountId, AccountTierRecord, PermissionTier, TierTransition, TransitionSource,
};

/// The single source of truth for one account's permission tier.
///
/// Holds exactly the persisted row `{tier, updated_at, reason}`. Every change
/// goes through [`set`](Self::set), which returns the audit record instead of
/// keeping a history. Locking is the owner's job; see `DecisionGate`.
#[derive(Debug, Clone)]
pub struct PermissionLedger {
    account_id: AccountId,
    tier: PermissionTier,
    updated_at: DateTime<Utc>,
    reason: String,
}

impl PermissionLedger {
    pub fn new(account_id: impl Into<AccountId>, tier: PermissionTier, reason: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            tier,
            updated_at: Utc::now(),
            reason: reason.into(),
        }
    }

    /// Rebuild a ledger from its persisted row.
    pub fn from_record(record: AccountTierRecord) -> Self {
        Self {
            account_id: record.account_id,
            tier: record.tier,
            updated_at: record.updated_at,
            reason: record.reason,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn current(&self) -> PermissionTier {
        self.tier
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Replace the tier and return the audit record of the change.
    pub fn set(
        &mut self,
        tier: PermissionTier,
        reason: impl Into<String>,
        source: TransitionSource,
        operator: Option<String>,
    ) -> TierTransition {
        let reason = reason.into();
        let at = Utc::now();
        let transition = TierTransition {
            account_id: self.account_id.clone(),
            from: self.tier,
            to: tier,
            reason: reason.clone(),
            source,
            operator,
            at,
        };
        self.tier = tier;
        self.updated_at = at;
        self.reason = reason;
        transition
    }

    /// Like [`set`](Self::set) for a raw tier number; unknown numbers are a
    /// precondition error and leave the ledger untouched.
    pub fn set_level(
        &mut self,
        level: u8,
        reason: impl Into<String>,
        source: TransitionSource,
        operator: Option<String>,
    ) -> tiergate_core::Result<TierTransition> {
        let tier = PermissionTier::try_from(level)?;
        Ok(self.set(tier, reason, source, operator))
    }

    /// The row a host persists for this account.
    pub fn record(&self) -> AccountTierRecord {
        AccountTierRecord {
            account_id: self.account_id.clone(),
            tier: self.tier,
            updated_at: self.updated_at,
            reason: self.reason.clone(),
        }
    }
}
