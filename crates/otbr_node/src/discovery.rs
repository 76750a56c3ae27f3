//! Border router discovery over mDNS/DNS-SD
//!
//! Home-automation controllers find Thread border routers by browsing for
//! `_meshcop._udp.local.`. This module builds that advertisement and hands it
//! to a [`ServiceResponder`]:
//!
//! - **Host**: [`MdnsSdResponder`] on `mdns-sd` (feature: host)
//! - **ESP32**: `EspMdnsResponder` on the ESP-IDF mDNS component (feature: esp32)
//! - **Tests**: [`RecordingResponder`]

use crate::backbone::BackboneInterface;
use crate::config::{Config, MAX_DEVICE_NAME_LEN};
use crate::error::{DiscoveryError, Result};
use crate::logging::tag;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Meshcop service type label
pub const MESHCOP_SERVICE: &str = "_meshcop";

/// Meshcop transport label
pub const MESHCOP_PROTO: &str = "_udp";

/// Meshcop TXT record version
pub const MESHCOP_RECORD_VERSION: &str = "1";

/// The `_meshcop._udp` advertisement of this border router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshcopService {
    /// mDNS hostname (`<hostname>.local`)
    pub hostname: String,
    /// Default instance name of the responder
    pub default_instance: String,
    /// Instance name of the meshcop service
    pub instance_name: String,
    pub service_type: String,
    pub protocol: String,
    pub port: u16,
    /// TXT items in advertisement order
    pub txt: Vec<(String, String)>,
}

impl MeshcopService {
    /// Builds the advertisement from the node configuration.
    pub fn from_config(config: &Config) -> Self {
        let device = &config.device.name;
        Self {
            hostname: device.clone(),
            default_instance: config.mdns.instance_name(&config.device).to_string(),
            instance_name: device.clone(),
            service_type: MESHCOP_SERVICE.to_string(),
            protocol: MESHCOP_PROTO.to_string(),
            port: config.mdns.port,
            txt: vec![
                ("rv".to_string(), MESHCOP_RECORD_VERSION.to_string()),
                ("dd".to_string(), device.clone()),
                ("vn".to_string(), config.mdns.vendor_name.clone()),
                ("mn".to_string(), config.mdns.model_name.clone()),
            ],
        }
    }

    /// DNS-SD service type, e.g. `_meshcop._udp.local.`
    pub fn full_type(&self) -> String {
        format!("{}.{}.local.", self.service_type, self.protocol)
    }

    /// Fully qualified instance name, e.g. `otbr-01._meshcop._udp.local.`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.instance_name, self.full_type())
    }

    /// Looks up a TXT value.
    pub fn txt_value(&self, key: &str) -> Option<&str> {
        self.txt
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn validate(&self) -> std::result::Result<(), DiscoveryError> {
        for name in [&self.hostname, &self.default_instance, &self.instance_name] {
            if name.is_empty() || name.len() > MAX_DEVICE_NAME_LEN || name.contains('.') {
                return Err(DiscoveryError::InvalidName { name: name.clone() });
            }
        }
        Ok(())
    }
}

/// An mDNS responder able to publish one hostname and its services.
pub trait ServiceResponder: Send {
    /// Starts the responder.
    fn init(&mut self) -> Result<()>;

    fn set_hostname(&mut self, hostname: &str) -> Result<()>;

    fn set_instance_name(&mut self, instance: &str) -> Result<()>;

    /// Publishes a service reachable at `iface`.
    fn add_service(&mut self, service: &MeshcopService, iface: &BackboneInterface) -> Result<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Advertises the border router on the backbone network.
///
/// Every responder failure is returned; the device cannot be commissioned
/// from a controller without the advertisement.
pub fn start_discovery(
    responder: &mut dyn ServiceResponder,
    config: &Config,
    iface: &BackboneInterface,
) -> Result<MeshcopService> {
    let service = MeshcopService::from_config(config);
    service.validate()?;

    responder.init()?;
    responder.set_hostname(&service.hostname)?;
    responder.set_instance_name(&service.default_instance)?;
    responder.add_service(&service, iface)?;

    log::info!(
        target: tag(),
        "mDNS started: {}.{}.{}.local ({})",
        service.instance_name,
        service.service_type,
        service.protocol,
        responder.name()
    );
    Ok(service)
}

// ============================================================================
// mdns-sd responder
// ============================================================================

#[cfg(feature = "host")]
pub use self::host::MdnsSdResponder;

#[cfg(feature = "host")]
mod host {
    use super::*;
    use crate::error::Error;
    use mdns_sd::{ServiceDaemon, ServiceInfo};
    use std::collections::HashMap;

    /// Responder backed by the `mdns-sd` daemon.
    pub struct MdnsSdResponder {
        daemon: Option<ServiceDaemon>,
        hostname: Option<String>,
        registered: Vec<String>,
    }

    impl MdnsSdResponder {
        pub fn new() -> Self {
            Self {
                daemon: None,
                hostname: None,
                registered: Vec::new(),
            }
        }

        fn daemon(&self) -> Result<&ServiceDaemon> {
            self.daemon.as_ref().ok_or_else(|| {
                Error::Discovery(DiscoveryError::ResponderInit(
                    "responder not initialized".to_string(),
                ))
            })
        }

        /// Withdraws every published service and stops the daemon.
        pub fn stop(&mut self) -> Result<()> {
            if let Some(daemon) = self.daemon.take() {
                for fullname in self.registered.drain(..) {
                    let _ = daemon.unregister(&fullname);
                }
                daemon.shutdown().ok();
                log::info!(target: tag(), "Stopped mDNS responder");
            }
            Ok(())
        }
    }

    impl Default for MdnsSdResponder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ServiceResponder for MdnsSdResponder {
        fn init(&mut self) -> Result<()> {
            if self.daemon.is_none() {
                let daemon = ServiceDaemon::new()
                    .map_err(|e| DiscoveryError::ResponderInit(e.to_string()))?;
                self.daemon = Some(daemon);
            }
            Ok(())
        }

        fn set_hostname(&mut self, hostname: &str) -> Result<()> {
            self.daemon()?;
            self.hostname = Some(format!("{}.local.", hostname));
            Ok(())
        }

        fn set_instance_name(&mut self, instance: &str) -> Result<()> {
            // mdns-sd has no responder-wide instance name; services carry their own.
            log::debug!(target: tag(), "mDNS default instance: {}", instance);
            Ok(())
        }

        fn add_service(
            &mut self,
            service: &MeshcopService,
            iface: &BackboneInterface,
        ) -> Result<()> {
            let hostname = self
                .hostname
                .clone()
                .unwrap_or_else(|| format!("{}.local.", service.hostname));

            let properties: HashMap<String, String> = service.txt.iter().cloned().collect();

            let info = ServiceInfo::new(
                &service.full_type(),
                &service.instance_name,
                &hostname,
                &iface.ip.to_string(),
                service.port,
                properties,
            )
            .map_err(|e| DiscoveryError::RegisterFailed {
                service: service.full_name(),
                reason: e.to_string(),
            })?;
            let fullname = info.get_fullname().to_string();

            self.daemon()?
                .register(info)
                .map_err(|e| DiscoveryError::RegisterFailed {
                    service: service.full_name(),
                    reason: e.to_string(),
                })?;

            log::info!(
                target: tag(),
                "Registered mDNS service: {} on {}:{}",
                fullname,
                iface.ip,
                service.port
            );
            self.registered.push(fullname);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "mdns-sd"
        }
    }

    impl Drop for MdnsSdResponder {
        fn drop(&mut self) {
            let _ = self.stop();
        }
    }
}

// ============================================================================
// Recording responder
// ============================================================================

/// What a [`RecordingResponder`] has been asked to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Published {
    pub initialized: bool,
    pub hostname: Option<String>,
    pub instance_name: Option<String>,
    pub services: Vec<(MeshcopService, BackboneInterface)>,
}

/// Responder that records calls instead of touching the network.
#[derive(Debug, Clone, Default)]
pub struct RecordingResponder {
    published: Arc<Mutex<Published>>,
    fail_init: bool,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A responder whose `init` fails.
    pub fn failing() -> Self {
        Self {
            fail_init: true,
            ..Default::default()
        }
    }

    /// Snapshot of the published state; clones share it.
    pub fn published(&self) -> Published {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Published) -> T) -> T {
        f(&mut self.published.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl ServiceResponder for RecordingResponder {
    fn init(&mut self) -> Result<()> {
        if self.fail_init {
            return Err(DiscoveryError::ResponderInit("no memory".to_string()).into());
        }
        self.with(|p| p.initialized = true);
        Ok(())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<()> {
        self.with(|p| p.hostname = Some(hostname.to_string()));
        Ok(())
    }

    fn set_instance_name(&mut self, instance: &str) -> Result<()> {
        self.with(|p| p.instance_name = Some(instance.to_string()));
        Ok(())
    }

    fn add_service(&mut self, service: &MeshcopService, iface: &BackboneInterface) -> Result<()> {
        self.with(|p| p.services.push((service.clone(), iface.clone())));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn iface() -> BackboneInterface {
        BackboneInterface {
            name: "sta0".to_string(),
            ip: Ipv4Addr::new(192, 168, 1, 50),
        }
    }

    #[test]
    fn test_meshcop_service_defaults() {
        let config = Config::default();
        let service = MeshcopService::from_config(&config);
        assert_eq!(service.full_type(), "_meshcop._udp.local.");
        assert_eq!(service.full_name(), "otbr-01._meshcop._udp.local.");
        assert_eq!(service.port, 49191);
        assert_eq!(service.txt_value("rv"), Some("1"));
        assert_eq!(service.txt_value("dd"), Some("otbr-01"));
        assert_eq!(service.txt_value("vn"), Some("Espressif"));
        assert_eq!(service.txt_value("mn"), Some("ESP32-C6 OTBR"));
        let keys: Vec<_> = service.txt.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["rv", "dd", "vn", "mn"]);
    }

    #[test]
    fn test_instance_name_override() {
        let mut config = Config::default();
        config.device.name = "otbr-garage".to_string();
        config.mdns.instance_name = Some("Garage Border Router".to_string());
        let service = MeshcopService::from_config(&config);
        assert_eq!(service.default_instance, "Garage Border Router");
        // the service itself is always named after the device
        assert_eq!(service.instance_name, "otbr-garage");
        assert_eq!(service.hostname, "otbr-garage");
    }

    #[test]
    fn test_start_discovery_publishes() {
        let config = Config::default();
        let mut responder = RecordingResponder::new();
        let service = start_discovery(&mut responder, &config, &iface()).unwrap();

        let published = responder.published();
        assert!(published.initialized);
        assert_eq!(published.hostname.as_deref(), Some("otbr-01"));
        assert_eq!(published.instance_name.as_deref(), Some("otbr-01"));
        assert_eq!(published.services.len(), 1);
        assert_eq!(published.services[0].0, service);
        assert_eq!(published.services[0].1, iface());
    }

    #[test]
    fn test_start_discovery_init_failure() {
        let config = Config::default();
        let mut responder = RecordingResponder::failing();
        let err = start_discovery(&mut responder, &config, &iface()).unwrap_err();
        assert_eq!(err.code(), "E_MDNS");
        assert!(err.is_fatal());
        assert!(responder.published().services.is_empty());
    }

    #[test]
    fn test_invalid_hostname_rejected() {
        let mut config = Config::default();
        config.device.name = "bad.name".to_string();
        let mut responder = RecordingResponder::new();
        assert!(start_discovery(&mut responder, &config, &iface()).is_err());
        assert!(!responder.published().initialized);
    }
}
