//! Local network discovery over mDNS / DNS-SD
//!
//! A node advertises its HTTP port under a fixed service type; any process
//! can browse for that type to list reachable nodes.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::DiscoverySettings;
use crate::error::{Error, Result};

/// Service type every node advertises
pub const SERVICE_TYPE: &str = "_edge-node._tcp.local.";

/// An active advertisement of this node
pub struct Discovery {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Discovery {
    /// Publish `instance` on the local network with the node's HTTP port
    pub fn advertise(settings: &DiscoverySettings, instance: &str, port: u16) -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(startup_error)?;

        let host = format!("{}.local.", crate::config::host_name());
        let properties = HashMap::from([(
            "version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        )]);

        let service = ServiceInfo::new(
            &settings.service_type,
            instance,
            &host,
            "",
            port,
            properties,
        )
        .map_err(startup_error)?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_string();
        daemon.register(service).map_err(startup_error)?;

        info!(service = %fullname, port, "Advertising node");
        Ok(Self { daemon, fullname })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Keep the advertisement up until `token` is cancelled, then withdraw
    /// it and shut the responder down.
    pub async fn serve(self, token: CancellationToken) -> Result<()> {
        token.cancelled().await;

        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!(service = %self.fullname, error = %e, "Failed to withdraw advertisement");
        }
        self.daemon
            .shutdown()
            .map_err(|e| Error::Internal(format!("mDNS responder shutdown failed: {}", e)))?;

        debug!(service = %self.fullname, "Advertisement withdrawn");
        Ok(())
    }
}

/// Collect nodes answering for the service type during the lookup window.
///
/// Returns whatever arrived before the window closed or `token` was
/// cancelled. Results are neither deduplicated nor probed.
pub async fn enumerate(
    settings: &DiscoverySettings,
    token: &CancellationToken,
) -> Result<Vec<SocketAddr>> {
    if token.is_cancelled() {
        return Ok(Vec::new());
    }

    let daemon = ServiceDaemon::new().map_err(startup_error)?;
    let receiver = daemon
        .browse(&settings.service_type)
        .map_err(startup_error)?;

    let window = tokio::time::sleep(settings.lookup_window());
    tokio::pin!(window);

    let mut found = Vec::new();
    loop {
        tokio::select! {
            _ = &mut window => break,
            _ = token.cancelled() => break,
            event = receiver.recv_async() => match event {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    match first_ipv4(info.get_addresses(), info.get_port()) {
                        Some(addr) => {
                            debug!(service = %info.get_fullname(), addr = %addr, "Node resolved");
                            found.push(addr);
                        }
                        None => trace!(service = %info.get_fullname(), "Resolved without IPv4 address"),
                    }
                }
                Ok(other) => trace!(event = ?other, "Browse event"),
                Err(_) => break,
            },
        }
    }

    if let Err(e) = daemon.stop_browse(&settings.service_type) {
        debug!(service_type = %settings.service_type, error = %e, "Failed to stop browsing");
    }
    if let Err(e) = daemon.shutdown() {
        warn!(error = %e, "mDNS browser shutdown failed");
    }

    Ok(found)
}

fn first_ipv4(addresses: &HashSet<IpAddr>, port: u16) -> Option<SocketAddr> {
    addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .map(|ip| SocketAddr::new(*ip, port))
}

fn startup_error(err: mdns_sd::Error) -> Error {
    Error::DiscoveryStartup {
        message: err.to_string(),
    }
}
