//! Host policy configuration.
//!
//! A host's policy splits into two halves. [`ExternalSettings`] is what it
//! advertises to renters: prices, limits, and the payout address every
//! contract must use. [`InternalSettings`] stays private: the global
//! collateral budget and the withdrawal-expiry bound. Both are read-only
//! to the verification engines; decisions always run against an immutable
//! [`PolicySnapshot`] so a verdict is reproducible from its inputs alone.

use crate::types::{BlockHeight, Currency, UnlockHash};
use serde::{Deserialize, Serialize};

/// Settings the host advertises to renters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSettings {
    /// Whether the host is taking on new obligations at all.
    #[serde(default)]
    pub accepting_contracts: bool,

    /// Longest contract duration the host accepts, in blocks.
    #[serde(default = "default_max_duration")]
    pub max_duration: BlockHeight,

    /// Minimum proof-window width the host accepts, in blocks.
    #[serde(default = "default_window_size")]
    pub window_size: BlockHeight,

    /// Most collateral the host will lock into a single contract.
    #[serde(default = "default_max_collateral")]
    pub max_collateral: Currency,

    /// Collateral the host risks per byte per block of stored data.
    #[serde(default = "default_collateral_rate")]
    pub collateral_rate: Currency,

    /// Flat price of forming or renewing a contract.
    #[serde(default = "default_contract_price")]
    pub contract_price: Currency,

    /// Price per byte per block of stored data.
    #[serde(default = "default_storage_price")]
    pub storage_price: Currency,

    /// Address every contract payout to the host must use.
    #[serde(default)]
    pub unlock_hash: UnlockHash,
}

impl Default for ExternalSettings {
    fn default() -> Self {
        Self {
            accepting_contracts: false,
            max_duration: default_max_duration(),
            window_size: default_window_size(),
            max_collateral: default_max_collateral(),
            collateral_rate: default_collateral_rate(),
            contract_price: default_contract_price(),
            storage_price: default_storage_price(),
            unlock_hash: UnlockHash::default(),
        }
    }
}

/// Settings the host keeps to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalSettings {
    /// Most collateral the host will have locked across all obligations at
    /// once.
    #[serde(default = "default_collateral_budget")]
    pub collateral_budget: Currency,

    /// How far past the current height a withdrawal message may expire.
    /// Bounds how long the host must remember withdrawal fingerprints.
    #[serde(default = "default_max_withdrawal_future_blocks")]
    pub max_withdrawal_future_blocks: BlockHeight,
}

impl InternalSettings {
    /// The highest withdrawal expiry acceptable at `current_height`.
    #[must_use]
    pub fn max_withdrawal_expiry(&self, current_height: BlockHeight) -> BlockHeight {
        current_height.saturating_add(self.max_withdrawal_future_blocks)
    }
}

impl Default for InternalSettings {
    fn default() -> Self {
        Self {
            collateral_budget: default_collateral_budget(),
            max_withdrawal_future_blocks: default_max_withdrawal_future_blocks(),
        }
    }
}

/// The host's full policy, as persisted on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    /// The advertised half.
    #[serde(default)]
    pub external: ExternalSettings,

    /// The private half.
    #[serde(default)]
    pub internal: InternalSettings,
}

impl HostSettings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save settings to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// An immutable snapshot of host policy and collateral state, taken
/// atomically before a verification runs.
///
/// Handing the gate sequence a snapshot rather than live settings makes
/// every decision reproducible: re-running with the same snapshot and
/// proposal yields the same verdict, regardless of concurrent policy
/// edits or other renewals.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    /// Advertised settings at capture time.
    pub external: ExternalSettings,
    /// Private settings at capture time.
    pub internal: InternalSettings,
    /// Collateral locked across other obligations at capture time,
    /// including pessimistic reservations for in-flight renewals.
    pub locked_collateral: Currency,
}

impl PolicySnapshot {
    /// Capture a snapshot of `settings` with the given locked collateral.
    #[must_use]
    pub fn capture(settings: &HostSettings, locked_collateral: Currency) -> Self {
        Self {
            external: settings.external.clone(),
            internal: settings.internal.clone(),
            locked_collateral,
        }
    }
}

const fn default_max_duration() -> BlockHeight {
    25_920 // ~6 months of 10-minute blocks
}

const fn default_window_size() -> BlockHeight {
    144 // ~24 hours
}

fn default_max_collateral() -> Currency {
    Currency::from_coins(5_000)
}

fn default_collateral_rate() -> Currency {
    Currency::new(100)
}

fn default_contract_price() -> Currency {
    Currency::from_coins(1)
}

fn default_storage_price() -> Currency {
    Currency::new(50)
}

fn default_collateral_budget() -> Currency {
    Currency::from_coins(100_000)
}

const fn default_max_withdrawal_future_blocks() -> BlockHeight {
    20
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_conservative() {
        let settings = HostSettings::default();
        assert!(!settings.external.accepting_contracts);
        assert!(settings.internal.collateral_budget > settings.external.max_collateral);
    }

    #[test]
    fn test_max_withdrawal_expiry() {
        let internal = InternalSettings::default();
        assert_eq!(internal.max_withdrawal_expiry(100), 120);
        // saturates instead of wrapping at the end of the chain's range
        assert_eq!(internal.max_withdrawal_expiry(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_settings_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("host.toml");

        let mut settings = HostSettings::default();
        settings.external.accepting_contracts = true;
        settings.external.max_collateral = Currency::from_coins(777);
        settings.internal.collateral_budget = Currency::from_coins(9_999);

        settings.to_file(&path).expect("save");
        let loaded = HostSettings::from_file(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("host.toml");
        std::fs::write(&path, "[external]\naccepting_contracts = true\n").expect("write");

        let loaded = HostSettings::from_file(&path).expect("load");
        assert!(loaded.external.accepting_contracts);
        assert_eq!(loaded.external.window_size, default_window_size());
        assert_eq!(
            loaded.internal.collateral_budget,
            default_collateral_budget()
        );
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut settings = HostSettings::default();
        let snapshot = PolicySnapshot::capture(&settings, Currency::from_coins(3));

        settings.external.accepting_contracts = true;
        settings.internal.collateral_budget = Currency::ZERO;

        assert!(!snapshot.external.accepting_contracts);
        assert_eq!(snapshot.internal.collateral_budget, default_collateral_budget());
        assert_eq!(snapshot.locked_collateral, Currency::from_coins(3));
    }
}
