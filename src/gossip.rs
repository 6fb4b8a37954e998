//! Gossip overlay using libp2p
//!
//! Joins a gossipsub overlay (TCP + noise + yamux, peers found through
//! libp2p's own mDNS behaviour) and subscribes to the function topic.
//! Deployed bytecode is published raw; received payloads are only logged.

use std::fmt;
use std::time::Duration;

use futures_util::StreamExt;
use libp2p::{
    gossipsub, mdns, noise,
    swarm::{NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::GossipSettings;
use crate::error::Error;

/// Topic deployed bytecode is published on
pub const FUNCTION_TOPIC: &str = "edge-node/functions";

/// Largest payload the overlay will carry; wasm modules exceed the
/// gossipsub default of 64 KiB.
pub const MAX_BROADCAST_BYTES: usize = 4 * 1024 * 1024;

/// Startup steps of the gossip layer, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipStage {
    OverlayJoin,
    TopicSubscribe,
}

impl fmt::Display for GossipStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GossipStage::OverlayJoin => write!(f, "overlay join"),
            GossipStage::TopicSubscribe => write!(f, "topic subscription"),
        }
    }
}

#[derive(NetworkBehaviour)]
pub struct OverlayBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub mdns: mdns::tokio::Behaviour,
}

pub(crate) enum GossipCommand {
    Publish { data: Vec<u8> },
}

/// Cloneable handle for publishing to the topic
#[derive(Clone)]
pub struct GossipHandle {
    cmd_tx: mpsc::Sender<GossipCommand>,
    peer_id: PeerId,
}

/// A joined and subscribed overlay, not yet driven
pub struct Gossip {
    swarm: Swarm<OverlayBehaviour>,
    topic: gossipsub::IdentTopic,
    cmd_rx: mpsc::Receiver<GossipCommand>,
    handle: GossipHandle,
}

impl Gossip {
    /// Join the overlay and subscribe to the configured topic.
    ///
    /// Either stage failing aborts the whole join.
    pub fn join(settings: &GossipSettings) -> crate::error::Result<Self> {
        let mut swarm = build_swarm(settings)
            .map_err(|e| Error::gossip_startup(GossipStage::OverlayJoin, format!("{:#}", e)))?;

        let listen_addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", settings.listen_port)
            .parse()
            .map_err(|e| Error::gossip_startup(GossipStage::OverlayJoin, format!("{}", e)))?;
        swarm
            .listen_on(listen_addr)
            .map_err(|e| Error::gossip_startup(GossipStage::OverlayJoin, e.to_string()))?;

        let topic = gossipsub::IdentTopic::new(settings.topic.as_str());
        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&topic)
            .map_err(|e| Error::gossip_startup(GossipStage::TopicSubscribe, format!("{:?}", e)))?;

        let peer_id = *swarm.local_peer_id();
        info!(peer_id = %peer_id, topic = %settings.topic, "Joined gossip overlay");

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        Ok(Self {
            swarm,
            topic,
            cmd_rx,
            handle: GossipHandle { cmd_tx, peer_id },
        })
    }

    pub fn handle(&self) -> GossipHandle {
        self.handle.clone()
    }

    /// Drive the overlay until `token` is cancelled or every handle is
    /// dropped. Not restarted after it returns.
    pub async fn run(self, token: CancellationToken) -> crate::error::Result<()> {
        let Gossip {
            mut swarm,
            topic,
            mut cmd_rx,
            handle,
        } = self;
        // Our own copy must not keep the command channel open
        drop(handle);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Gossip loop cancelled");
                    break;
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(GossipCommand::Publish { data }) => {
                        let size = data.len();
                        match swarm.behaviour_mut().gossipsub.publish(topic.clone(), data) {
                            Ok(id) => trace!(message_id = %id, size, "Published to topic"),
                            Err(e) => debug!(size, error = %e, "Broadcast not delivered"),
                        }
                    }
                    None => {
                        debug!("Gossip command channel closed");
                        break;
                    }
                },

                event = swarm.select_next_some() => handle_event(&mut swarm, event),
            }
        }

        Ok(())
    }
}

impl GossipHandle {
    /// Queue `data` for publishing on the function topic.
    ///
    /// Never waits on the overlay. Fails only when the loop is gone or its
    /// queue is full; delivery to peers is not reported.
    pub fn broadcast(&self, data: Vec<u8>) -> crate::error::Result<()> {
        self.cmd_tx
            .try_send(GossipCommand::Publish { data })
            .map_err(|e| match e {
                TrySendError::Full(_) => Error::Broadcast {
                    message: "gossip queue is full".to_string(),
                },
                TrySendError::Closed(_) => loop_stopped(),
            })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// A handle whose loop is alive but never drains; the queue is already full
    #[cfg(test)]
    pub(crate) fn stalled() -> (Self, mpsc::Receiver<GossipCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let handle = Self {
            cmd_tx,
            peer_id: PeerId::random(),
        };
        let _ = handle.broadcast(Vec::new());
        (handle, cmd_rx)
    }

    /// A handle whose loop is already gone; every broadcast fails
    #[cfg(test)]
    pub(crate) fn disconnected() -> Self {
        let (cmd_tx, _) = mpsc::channel(1);
        Self {
            cmd_tx,
            peer_id: PeerId::random(),
        }
    }
}

fn loop_stopped() -> Error {
    Error::Broadcast {
        message: "gossip loop is not running".to_string(),
    }
}

fn build_swarm(settings: &GossipSettings) -> anyhow::Result<Swarm<OverlayBehaviour>> {
    let heartbeat = Duration::from_millis(settings.heartbeat_interval_ms);
    let idle_timeout = Duration::from_secs(settings.idle_connection_timeout_secs);

    let swarm = SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )?
        .with_behaviour(|key| {
            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(heartbeat)
                .validation_mode(gossipsub::ValidationMode::Strict)
                .max_transmit_size(MAX_BROADCAST_BYTES)
                .build()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

            let gossipsub = gossipsub::Behaviour::new(
                gossipsub::MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )?;

            let mdns =
                mdns::tokio::Behaviour::new(mdns::Config::default(), key.public().to_peer_id())?;

            Ok(OverlayBehaviour { gossipsub, mdns })
        })?
        .with_swarm_config(|c| c.with_idle_connection_timeout(idle_timeout))
        .build();

    Ok(swarm)
}

fn handle_event(swarm: &mut Swarm<OverlayBehaviour>, event: SwarmEvent<OverlayBehaviourEvent>) {
    match event {
        SwarmEvent::Behaviour(OverlayBehaviourEvent::Gossipsub(gossipsub::Event::Message {
            propagation_source,
            message,
            ..
        })) => {
            debug!(
                bytes = message.data.len(),
                source = ?message.source,
                via = %propagation_source,
                "Received function broadcast"
            );
        }
        SwarmEvent::Behaviour(OverlayBehaviourEvent::Mdns(mdns::Event::Discovered(list))) => {
            for (peer_id, addr) in list {
                debug!(peer_id = %peer_id, addr = %addr, "Overlay peer discovered");
                swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
            }
        }
        SwarmEvent::Behaviour(OverlayBehaviourEvent::Mdns(mdns::Event::Expired(list))) => {
            for (peer_id, _) in list {
                debug!(peer_id = %peer_id, "Overlay peer expired");
                swarm.behaviour_mut().gossipsub.remove_explicit_peer(&peer_id);
            }
        }
        SwarmEvent::NewListenAddr { address, .. } => {
            info!(addr = %address, "Gossip listening");
        }
        other => trace!(event = ?other, "Swarm event"),
    }
}
