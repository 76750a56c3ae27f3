//! Dataset acquisition at boot
//!
//! The border router needs an active operational dataset before it can
//! start Thread. Sources are tried in order, and a failing source falls
//! through to the next one:
//!
//! 1. the dataset the stack saved on a previous boot (or via the CLI)
//! 2. the TLV hex string from the configuration
//! 3. a freshly created network, if `auto_start` is set
//!
//! With none of them the device waits to be provisioned from a controller or
//! the serial console.

use crate::config::ThreadConfig;
use crate::dataset::DatasetTlvs;
use crate::error::{Error, Result, ThreadError};
use crate::logging::tag;
use crate::thread::ThreadInstance;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Console commands that provision an unprovisioned device.
pub const PROVISIONING_COMMANDS: [&str; 3] = [
    "dataset set active <hex-TLV>",
    "ifconfig up",
    "thread start",
];

/// Where the active dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSource {
    /// Stored by the stack
    Saved,
    /// From `thread.dataset_tlvs`
    Configured,
    /// Generated because `thread.auto_start` is set
    Created,
    /// No dataset; waiting for provisioning
    Unprovisioned,
}

impl DatasetSource {
    /// Returns `true` if there is an active dataset to start Thread with.
    pub fn is_ready(&self) -> bool {
        !matches!(self, DatasetSource::Unprovisioned)
    }
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatasetSource::Saved => "saved",
            DatasetSource::Configured => "configured",
            DatasetSource::Created => "created",
            DatasetSource::Unprovisioned => "unprovisioned",
        };
        f.write_str(s)
    }
}

/// Walks the fallback chain. Must be called with the stack lock held.
pub fn acquire_dataset<I: ThreadInstance + ?Sized>(
    instance: &mut I,
    config: &ThreadConfig,
) -> DatasetSource {
    match instance.active_dataset() {
        Ok(dataset) => {
            log::info!(target: tag(), "Using saved Thread dataset ({})", dataset.summary());
            return DatasetSource::Saved;
        }
        Err(Error::Thread(ThreadError::NotFound)) => {}
        Err(Error::Dataset(e)) => {
            // the stack holds it; only our decoder cannot read it
            log::warn!(target: tag(), "Using saved Thread dataset (not decodable here: {})", e);
            return DatasetSource::Saved;
        }
        Err(e) => log::warn!(target: tag(), "Could not read saved dataset: {}", e),
    }

    if load_configured_dataset(instance, config) {
        return DatasetSource::Configured;
    }

    if config.auto_start {
        match create_dataset(instance, config) {
            Ok(()) => return DatasetSource::Created,
            Err(e) => log::error!(target: tag(), "Failed to create new network: {}", e),
        }
    }

    DatasetSource::Unprovisioned
}

fn load_configured_dataset<I: ThreadInstance + ?Sized>(instance: &mut I, config: &ThreadConfig) -> bool {
    if config.dataset_tlvs.is_empty() {
        return false;
    }

    let tlvs = match DatasetTlvs::from_hex(&config.dataset_tlvs) {
        Ok(tlvs) => tlvs,
        Err(e) => {
            log::error!(target: tag(), "Configured dataset TLVs: invalid hex string ({})", e);
            return false;
        }
    };

    if let Err(e) = instance.set_active_tlvs(&tlvs) {
        log::error!(target: tag(), "Failed to set active dataset from TLVs: {}", e);
        return false;
    }

    log::info!(target: tag(), "Thread dataset loaded from config ({} bytes)", tlvs.len());
    true
}

fn create_dataset<I: ThreadInstance + ?Sized>(instance: &mut I, config: &ThreadConfig) -> Result<()> {
    log::info!(target: tag(), "Creating new Thread network");
    let mut dataset = instance.create_new_network()?;
    dataset.apply_overrides(Some(config.channel), Some(&config.network_name));
    instance.set_active_dataset(&dataset)?;
    log::info!(
        target: tag(),
        "New network created: ch={}, name={}",
        config.channel,
        dataset.network_name.as_deref().unwrap_or_default()
    );
    Ok(())
}

/// Enables IPv6 and Thread when a dataset is ready, otherwise logs how to
/// provision the device. Must be called with the stack lock held.
pub fn bring_up_mesh<I: ThreadInstance + ?Sized>(instance: &mut I, source: DatasetSource) -> Result<()> {
    if !source.is_ready() {
        log::info!(target: tag(), "No Thread dataset configured");
        log::info!(target: tag(), "Provision via Home Assistant or serial CLI:");
        for command in PROVISIONING_COMMANDS {
            log::info!(target: tag(), "  > {}", command);
        }
        return Ok(());
    }

    instance.set_ip6_enabled(true)?;
    instance.set_thread_enabled(true)?;
    log::info!(target: tag(), "Thread interface up ({} dataset), joining network", source);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::OperationalDataset;
    use crate::memory::MemoryStore;
    use crate::simulated::{SimulatedThreadStack, ACTIVE_DATASET_KEY, SETTINGS_NAMESPACE};
    use crate::storage_trait::{init_persistent_storage, lock_store, share};
    use crate::thread::{DeviceRole, OtPlatformConfig, ThreadStack};

    fn stack(fail_create: bool) -> SimulatedThreadStack {
        let store = share(MemoryStore::new());
        init_persistent_storage(&mut *lock_store(&store).unwrap()).unwrap();
        let mut stack = SimulatedThreadStack::new(store);
        if fail_create {
            stack = stack.fail_create_new_network();
        }
        stack.init(&OtPlatformConfig::native(false)).unwrap();
        stack
    }

    fn acquire(stack: &SimulatedThreadStack, config: &ThreadConfig) -> DatasetSource {
        stack.with_lock(|i| acquire_dataset(i, config)).unwrap()
    }

    fn random_hex() -> String {
        OperationalDataset::new_random().to_tlvs().unwrap().to_hex()
    }

    #[test]
    fn test_nothing_configured() {
        let stack = stack(false);
        let source = acquire(&stack, &ThreadConfig::default());
        assert_eq!(source, DatasetSource::Unprovisioned);
        stack.with_lock(|i| bring_up_mesh(i, source)).unwrap().unwrap();
        assert_eq!(stack.probe().role(), DeviceRole::Disabled);
        assert!(!stack.probe().ip6_enabled());
    }

    #[test]
    fn test_saved_dataset_wins() {
        let stack = stack(false);
        let saved = OperationalDataset::new_random();
        stack
            .with_lock(|i| i.set_active_dataset(&saved))
            .unwrap()
            .unwrap();

        let config = ThreadConfig {
            dataset_tlvs: random_hex(),
            auto_start: true,
            ..Default::default()
        };
        assert_eq!(acquire(&stack, &config), DatasetSource::Saved);
        assert_eq!(stack.probe().active_dataset().unwrap(), saved);
    }

    #[test]
    fn test_configured_dataset() {
        let stack = stack(false);
        let hex = random_hex();
        let config = ThreadConfig {
            dataset_tlvs: hex.clone(),
            ..Default::default()
        };
        assert_eq!(acquire(&stack, &config), DatasetSource::Configured);
        let active = stack.probe().active_dataset().unwrap();
        assert_eq!(active.to_tlvs().unwrap().to_hex(), hex);
    }

    #[test]
    fn test_bad_hex_falls_through_to_create() {
        let stack = stack(false);
        let config = ThreadConfig {
            dataset_tlvs: "0e0".to_string(),
            auto_start: true,
            channel: 20,
            network_name: "A-Very-Long-Network-Name".to_string(),
            ..Default::default()
        };
        assert_eq!(acquire(&stack, &config), DatasetSource::Created);
        let active = stack.probe().active_dataset().unwrap();
        assert_eq!(active.channel, Some(20));
        assert_eq!(active.network_name.as_deref(), Some("A-Very-Long-Netw"));
    }

    #[test]
    fn test_rejected_tlvs_without_auto_start() {
        let stack = stack(false);
        // valid hex, but only a channel TLV
        let config = ThreadConfig {
            dataset_tlvs: "000300000f".to_string(),
            ..Default::default()
        };
        assert_eq!(acquire(&stack, &config), DatasetSource::Unprovisioned);
        assert!(stack.probe().active_dataset().is_none());
    }

    #[test]
    fn test_undecodable_saved_dataset_is_kept() {
        let store = share(MemoryStore::new());
        init_persistent_storage(&mut *lock_store(&store).unwrap()).unwrap();
        let mut saved = OperationalDataset::new_random().to_tlvs().unwrap().as_bytes().to_vec();
        // channel mask with a page 1 entry only
        saved.extend_from_slice(&[53, 6, 1, 4, 0, 0, 0, 0]);
        lock_store(&store)
            .unwrap()
            .set(SETTINGS_NAMESPACE, ACTIVE_DATASET_KEY, &saved)
            .unwrap();

        let mut stack = SimulatedThreadStack::new(store.clone());
        stack.init(&OtPlatformConfig::native(false)).unwrap();
        let config = ThreadConfig {
            dataset_tlvs: random_hex(),
            auto_start: true,
            ..Default::default()
        };
        let source = acquire(&stack, &config);
        assert_eq!(source, DatasetSource::Saved);
        assert_eq!(
            lock_store(&store)
                .unwrap()
                .get(SETTINGS_NAMESPACE, ACTIVE_DATASET_KEY)
                .unwrap(),
            Some(saved)
        );

        stack.with_lock(|i| bring_up_mesh(i, source)).unwrap().unwrap();
        assert_eq!(stack.probe().role(), DeviceRole::Leader);
    }

    #[test]
    fn test_failed_create_waits_for_provisioning() {
        let stack = stack(true);
        let config = ThreadConfig {
            auto_start: true,
            ..Default::default()
        };
        let source = acquire(&stack, &config);
        assert_eq!(source, DatasetSource::Unprovisioned);
        stack.with_lock(|i| bring_up_mesh(i, source)).unwrap().unwrap();
        assert!(!stack.probe().thread_enabled());
    }

    #[test]
    fn test_bring_up_enables_interfaces() {
        let stack = stack(false);
        let config = ThreadConfig {
            auto_start: true,
            ..Default::default()
        };
        let source = acquire(&stack, &config);
        stack.with_lock(|i| bring_up_mesh(i, source)).unwrap().unwrap();
        let probe = stack.probe();
        assert!(probe.ip6_enabled());
        assert!(probe.thread_enabled());
        assert_eq!(probe.role(), DeviceRole::Leader);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(DatasetSource::Configured.to_string(), "configured");
        assert!(!DatasetSource::Unprovisioned.is_ready());
        assert!(DatasetSource::Saved.is_ready());
    }
}
