//! Constant-bit-rate flows between node pairs.

use crate::config::TrafficConfig;
use crate::routing::Topology;
use crate::scenario::NodeId;
use rand::Rng;
use serde::Serialize;

/// One CBR flow. Sends `packet_size` bytes every packet interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flow {
    pub id: usize,
    pub source: NodeId,
    pub destination: NodeId,
}

/// Fate of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered { hops: u32 },
    Dropped,
}

/// Packet counters over all flows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,

    /// Sum of hop counts over delivered packets
    pub total_hops: u64,

    pub bytes_delivered: u64,
}

impl TrafficStats {
    pub fn record(&mut self, delivery: Delivery, packet_size: u32) {
        self.sent += 1;
        match delivery {
            Delivery::Delivered { hops } => {
                self.delivered += 1;
                self.total_hops += hops as u64;
                self.bytes_delivered += packet_size as u64;
            }
            Delivery::Dropped => self.dropped += 1,
        }
    }

    /// Fraction of sent packets that were delivered (0 before any send).
    pub fn delivery_ratio(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.delivered as f64 / self.sent as f64
        }
    }

    pub fn mean_hops(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.total_hops as f64 / self.delivered as f64
        }
    }
}

/// Draws `config.flows` source/destination pairs with distinct endpoints.
///
/// Needs at least two nodes when any flow is configured.
pub fn plan_flows<R: Rng + ?Sized>(config: &TrafficConfig, node_count: usize, rng: &mut R) -> Vec<Flow> {
    if node_count < 2 {
        return Vec::new();
    }
    let n = node_count as u32;

    (0..config.flows)
        .map(|id| {
            let source = rng.gen_range(0..n);
            let mut destination = rng.gen_range(0..n - 1);
            if destination >= source {
                destination += 1;
            }
            Flow {
                id,
                source: NodeId(source),
                destination: NodeId(destination),
            }
        })
        .collect()
}

/// Routes one packet of `flow` over the current topology.
pub fn deliver(flow: &Flow, topology: &Topology) -> Delivery {
    match topology.route(flow.source, flow.destination) {
        Some(route) => Delivery::Delivered { hops: route.hops },
        None => Delivery::Dropped,
    }
}
