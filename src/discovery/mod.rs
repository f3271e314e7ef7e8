//! Device discovery module
//!
//! mDNS/DNS-SD discovery of cast receivers on the local network. Cast
//! devices advertise `_googlecast._tcp` and publish their identity in TXT
//! records.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use thiserror::Error;
use tokio::sync::mpsc;

/// Service type cast receivers advertise
pub const SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// A cast receiver found on the network
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Device id (TXT `id`)
    pub id: String,
    /// Friendly name shown to users (TXT `fn`)
    pub friendly_name: String,
    /// Device model (TXT `md`)
    pub model: String,
    /// mDNS service instance name
    pub fullname: String,
    /// IP addresses the device answers on
    pub addresses: Vec<IpAddr>,
    /// Control channel port (normally 8009)
    pub port: u16,
}

impl DiscoveredDevice {
    /// Get a socket address for the control channel
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addresses
            .first()
            .map(|ip| SocketAddr::new(*ip, self.port))
    }
}

/// Events from the discovery service
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A new device was resolved
    DeviceFound(DiscoveredDevice),
    /// A device's advertisement went away
    DeviceLost(String), // fullname
}

/// Browse for cast devices, forwarding events until `events` closes.
///
/// The mdns-sd receiver is synchronous; the blocking recv loop runs on a
/// dedicated blocking task so it never stalls the runtime.
pub fn browse(events: mpsc::Sender<DiscoveryEvent>) -> DiscoveryResult<ServiceDaemon> {
    let mdns = ServiceDaemon::new()?;
    let receiver = mdns.browse(SERVICE_TYPE)?;

    tokio::task::spawn_blocking(move || {
        while let Ok(event) = receiver.recv() {
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    let device = DiscoveredDevice {
                        id: info
                            .get_property_val_str("id")
                            .unwrap_or_default()
                            .to_string(),
                        friendly_name: info
                            .get_property_val_str("fn")
                            .unwrap_or_default()
                            .to_string(),
                        model: info
                            .get_property_val_str("md")
                            .unwrap_or_default()
                            .to_string(),
                        fullname: info.get_fullname().to_string(),
                        addresses: info.get_addresses().iter().copied().collect(),
                        port: info.get_port(),
                    };

                    tracing::debug!(
                        name = %device.friendly_name,
                        model = %device.model,
                        "resolved cast device"
                    );

                    if events.blocking_send(DiscoveryEvent::DeviceFound(device)).is_err() {
                        break;
                    }
                }
                ServiceEvent::ServiceRemoved(_, fullname) => {
                    if events
                        .blocking_send(DiscoveryEvent::DeviceLost(fullname))
                        .is_err()
                    {
                        break;
                    }
                }
                _ => {}
            }
        }
    });

    Ok(mdns)
}

/// Scan for `timeout`, returning every device resolved in that window.
pub async fn scan(timeout: Duration) -> DiscoveryResult<Vec<DiscoveredDevice>> {
    let (tx, mut rx) = mpsc::channel(64);
    let mdns = browse(tx)?;

    let mut devices: HashMap<String, DiscoveredDevice> = HashMap::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(DiscoveryEvent::DeviceFound(device))) => {
                devices.insert(device.fullname.clone(), device);
            }
            Ok(Some(DiscoveryEvent::DeviceLost(fullname))) => {
                devices.remove(&fullname);
            }
            Ok(None) | Err(_) => break,
        }
    }

    drop(rx);
    if let Err(e) = mdns.shutdown() {
        tracing::debug!("mDNS daemon shutdown: {e}");
    }

    Ok(devices.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr_prefers_first_address() {
        let device = DiscoveredDevice {
            id: "abc".to_string(),
            friendly_name: "Living Room".to_string(),
            model: "Chromecast".to_string(),
            fullname: "Living-Room._googlecast._tcp.local.".to_string(),
            addresses: vec!["192.168.1.20".parse().unwrap(), "10.0.0.5".parse().unwrap()],
            port: 8009,
        };

        assert_eq!(
            device.socket_addr(),
            Some("192.168.1.20:8009".parse().unwrap())
        );
    }

    #[test]
    fn test_socket_addr_none_without_addresses() {
        let device = DiscoveredDevice {
            id: String::new(),
            friendly_name: String::new(),
            model: String::new(),
            fullname: String::new(),
            addresses: Vec::new(),
            port: 8009,
        };
        assert!(device.socket_addr().is_none());
    }
}
