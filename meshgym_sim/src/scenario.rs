//! The simulated mesh: nodes, mobility, routing and traffic.
//!
//! A [`Scenario`] is the world a [`Scheduler<Scenario>`] drives. It is built
//! once by [`Scenario::create`], which also installs its recurring events:
//! - mobility update every `mobility.update_interval`
//! - routing refresh every `routing.refresh_interval`, first at t = 0
//! - one packet send per traffic flow every packet interval
//!
//! After creation the scenario is only mutated from inside those events or
//! from zero-delay events requested through [`Scenario::request_redirect`].

use crate::config::{GridConfig, GridLayout, ScenarioConfig};
use crate::error::SimError;
use crate::mobility::{MobilityState, RandomDirection};
use crate::routing::{Route, Topology};
use crate::scheduler::Scheduler;
use crate::seeds::{SeedStreams, Stream};
use crate::traffic::{self, Delivery, Flow, TrafficStats};
use meshgym_env::ActionScheduler;
use nalgebra::Vector3;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Index of a node in the scenario (0-based, contiguous).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// One mesh node.
///
/// Routing neighbors are not stored per node: they belong to the current
/// [`Topology`] and are read with [`Scenario::neighbors_of`].
#[derive(Debug, Clone)]
pub struct SimulatedNode {
    pub id: NodeId,
    pub mobility: MobilityState,
}

/// Initial position of node `index` on the allocation grid (z = 0).
pub fn grid_position(grid: &GridConfig, index: usize) -> Vector3<f64> {
    let width = grid.grid_width.max(1) as usize;
    let (major, minor) = (index / width, index % width);
    let (col, row) = match grid.layout {
        GridLayout::RowFirst => (minor, major),
        GridLayout::ColumnFirst => (major, minor),
    };
    Vector3::new(
        grid.min_x + grid.delta_x * col as f64,
        grid.min_y + grid.delta_y * row as f64,
        0.0,
    )
}

/// The mesh world.
pub struct Scenario {
    config: ScenarioConfig,
    nodes: Vec<SimulatedNode>,
    mobility: RandomDirection,
    topology: Topology,
    flows: Vec<Flow>,
    traffic: TrafficStats,
    routing_refreshes: u64,
    redirects: u64,
}

impl Scenario {
    /// Places the nodes and installs the scenario's recurring events on
    /// `scheduler`, relative to its current time.
    pub fn create(
        config: ScenarioConfig,
        streams: &SeedStreams,
        scheduler: &mut Scheduler<Scenario>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let now = scheduler.now();

        let mut mobility = RandomDirection::new(&config.mobility, streams.rng(Stream::Mobility));
        let nodes: Vec<SimulatedNode> = (0..config.node_count)
            .map(|i| {
                let id = NodeId(i as u32);
                let position = grid_position(&config.grid, i);
                SimulatedNode {
                    id,
                    mobility: mobility.start(id, position, now),
                }
            })
            .collect();

        let mut traffic_rng = streams.rng(Stream::Traffic);
        let flows = traffic::plan_flows(&config.traffic, nodes.len(), &mut traffic_rng);
        for flow in &flows {
            debug!(flow = flow.id, src = %flow.source, dst = %flow.destination, "Planned flow");
        }

        let positions: Vec<_> = nodes.iter().map(|n| n.mobility.position).collect();
        let topology = Topology::compute(&positions, config.routing.radio_range, config.routing.protocol);

        let update = config.mobility.update_interval;
        scheduler.schedule_periodic(update, update, |s, world: &mut Scenario| {
            world.advance_mobility(s.now());
            Ok(())
        })?;

        scheduler.schedule_periodic(Duration::ZERO, config.routing.refresh_interval, |s, world: &mut Scenario| {
            world.refresh_routing(s.now());
            Ok(())
        })?;

        let interval = config.traffic.packet_interval();
        for flow in 0..flows.len() {
            scheduler.schedule_periodic(interval, interval, move |_, world: &mut Scenario| {
                world.send_packet(flow);
                Ok(())
            })?;
        }

        info!(
            nodes = nodes.len(),
            flows = flows.len(),
            routing = %config.routing.protocol,
            "Scenario created"
        );

        Ok(Self {
            config,
            nodes,
            mobility,
            topology,
            flows,
            traffic: TrafficStats::default(),
            routing_refreshes: 0,
            redirects: 0,
        })
    }

    // ------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[SimulatedNode] {
        &self.nodes
    }

    /// Position as of the last mobility update.
    pub fn position_of(&self, id: NodeId) -> Option<Vector3<f64>> {
        self.nodes.get(id.0 as usize).map(|n| n.mobility.position)
    }

    /// Routing neighbors as of the last routing refresh.
    pub fn neighbors_of(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.topology.neighbors_of(id)
    }

    pub fn route(&self, src: NodeId, dst: NodeId) -> Option<Route> {
        self.topology.route(src, dst)
    }

    pub fn link_count(&self) -> usize {
        self.topology.link_count()
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn traffic_stats(&self) -> &TrafficStats {
        &self.traffic
    }

    pub fn routing_refreshes(&self) -> u64 {
        self.routing_refreshes
    }

    /// Course changes over all nodes, redirects included.
    pub fn course_changes(&self) -> u64 {
        self.nodes.iter().map(|n| n.mobility.course_changes).sum()
    }

    pub fn redirects(&self) -> u64 {
        self.redirects
    }

    // ------------------------------------------------------------------
    // Mutations (called from scheduled events only)
    // ------------------------------------------------------------------

    /// Integrates every node's kinematics up to `now`.
    pub fn advance_mobility(&mut self, now: Duration) {
        for node in &mut self.nodes {
            self.mobility.advance(node.id, &mut node.mobility, now);
        }
    }

    /// Recomputes neighbor sets and routing tables from positions at `now`.
    pub fn refresh_routing(&mut self, now: Duration) {
        self.advance_mobility(now);
        let positions: Vec<_> = self.nodes.iter().map(|n| n.mobility.position).collect();
        self.topology = Topology::compute(
            &positions,
            self.config.routing.radio_range,
            self.config.routing.protocol,
        );
        self.routing_refreshes += 1;
        debug!(at = ?now, links = self.topology.link_count(), "Routing refreshed");
    }

    /// Sends one packet of flow `index` over the current routing tables.
    pub fn send_packet(&mut self, index: usize) -> Option<Delivery> {
        let flow = self.flows.get(index)?;
        let delivery = traffic::deliver(flow, &self.topology);
        self.traffic.record(delivery, self.config.traffic.packet_size);
        Some(delivery)
    }

    /// Sends node `id` off in a fresh random direction at `now`.
    pub fn redirect_node(&mut self, id: NodeId, now: Duration) -> Result<(), SimError> {
        let node = self
            .nodes
            .get_mut(id.0 as usize)
            .ok_or(SimError::UnknownNode(id.0))?;
        self.mobility.redirect(id, &mut node.mobility, now);
        self.redirects += 1;
        debug!(node = %id, at = ?now, "Node redirected");
        Ok(())
    }

    /// Asks for a zero-delay redirect of node `id`.
    ///
    /// Nothing changes until the scheduled event runs; an id outside the
    /// scenario is logged and ignored then.
    pub fn request_redirect(id: NodeId, scheduler: &mut dyn ActionScheduler<Scenario>) {
        let at = scheduler.now();
        scheduler.defer(
            Duration::ZERO,
            Box::new(move |world: &mut Scenario| {
                if let Err(e) = world.redirect_node(id, at) {
                    warn!(node = %id, error = %e, "Redirect failed");
                }
            }),
        );
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("nodes", &self.nodes.len())
            .field("links", &self.topology.link_count())
            .field("flows", &self.flows.len())
            .field("traffic", &self.traffic)
            .finish()
    }
}
