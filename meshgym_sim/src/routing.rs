//! Range-based link graph and shortest-hop routing tables.
//!
//! Links are symmetric: two nodes are neighbors when they are at most
//! `radio_range` apart. With [`RoutingProtocol::Olsr`] every node gets a
//! next hop for every reachable destination (breadth-first, ties broken by
//! lowest node id); with [`RoutingProtocol::None`] only direct neighbors are
//! reachable.

use crate::config::RoutingProtocol;
use crate::scenario::NodeId;
use nalgebra::Vector3;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Entry of a routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// First hop towards the destination
    pub next_hop: NodeId,

    /// Path length in links
    pub hops: u32,
}

/// Neighbor sets and routing tables computed from one position snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    neighbors: Vec<BTreeSet<NodeId>>,
    routes: Vec<BTreeMap<NodeId, Route>>,
    link_count: usize,
}

impl Topology {
    /// Builds the topology for `positions`, indexed by node id.
    pub fn compute(positions: &[Vector3<f64>], radio_range: f64, protocol: RoutingProtocol) -> Self {
        let n = positions.len();
        let mut neighbors = vec![BTreeSet::new(); n];
        let mut link_count = 0;

        for i in 0..n {
            for j in (i + 1)..n {
                if (positions[i] - positions[j]).norm() <= radio_range {
                    neighbors[i].insert(NodeId(j as u32));
                    neighbors[j].insert(NodeId(i as u32));
                    link_count += 1;
                }
            }
        }

        let routes = (0..n)
            .map(|src| match protocol {
                RoutingProtocol::Olsr => shortest_hops(&neighbors, src),
                RoutingProtocol::None => neighbors[src]
                    .iter()
                    .map(|&nb| (nb, Route { next_hop: nb, hops: 1 }))
                    .collect(),
            })
            .collect();

        Self {
            neighbors,
            routes,
            link_count,
        }
    }

    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Number of undirected links.
    pub fn link_count(&self) -> usize {
        self.link_count
    }

    pub fn neighbors_of(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.neighbors.get(id.0 as usize)
    }

    /// Route from `src` to `dst`, if `dst` is reachable.
    ///
    /// A node always reaches itself in zero hops.
    pub fn route(&self, src: NodeId, dst: NodeId) -> Option<Route> {
        if src == dst && (src.0 as usize) < self.node_count() {
            return Some(Route {
                next_hop: src,
                hops: 0,
            });
        }
        self.routes.get(src.0 as usize)?.get(&dst).copied()
    }

    /// Routing table of `src`.
    pub fn table(&self, src: NodeId) -> Option<&BTreeMap<NodeId, Route>> {
        self.routes.get(src.0 as usize)
    }
}

/// Breadth-first search from `src`.
///
/// Neighbors are visited in ascending id order, so each level of the queue
/// is sorted by first hop and the first discovery of a node carries the
/// lowest first hop among all shortest paths.
fn shortest_hops(neighbors: &[BTreeSet<NodeId>], src: usize) -> BTreeMap<NodeId, Route> {
    let mut table = BTreeMap::new();
    let mut visited = vec![false; neighbors.len()];
    let mut queue = VecDeque::new();
    visited[src] = true;

    for &nb in &neighbors[src] {
        visited[nb.0 as usize] = true;
        table.insert(nb, Route { next_hop: nb, hops: 1 });
        queue.push_back((nb, nb, 1u32));
    }

    while let Some((node, first_hop, hops)) = queue.pop_front() {
        for &next in &neighbors[node.0 as usize] {
            let idx = next.0 as usize;
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            table.insert(
                next,
                Route {
                    next_hop: first_hop,
                    hops: hops + 1,
                },
            );
            queue.push_back((next, first_hop, hops + 1));
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(n: usize, spacing: f64) -> Vec<Vector3<f64>> {
        (0..n).map(|i| Vector3::new(i as f64 * spacing, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_neighbors_within_range() {
        let topo = Topology::compute(&line(3, 80.0), 100.0, RoutingProtocol::Olsr);

        assert_eq!(topo.link_count(), 2);
        let n1: Vec<_> = topo.neighbors_of(NodeId(1)).unwrap().iter().copied().collect();
        assert_eq!(n1, vec![NodeId(0), NodeId(2)]);
        assert!(!topo.neighbors_of(NodeId(0)).unwrap().contains(&NodeId(2)));
    }

    #[test]
    fn test_multi_hop_route() {
        let topo = Topology::compute(&line(4, 80.0), 100.0, RoutingProtocol::Olsr);

        let route = topo.route(NodeId(0), NodeId(3)).unwrap();
        assert_eq!(route.next_hop, NodeId(1));
        assert_eq!(route.hops, 3);
        assert_eq!(topo.route(NodeId(2), NodeId(2)).unwrap().hops, 0);
    }

    #[test]
    fn test_direct_routing_only_reaches_neighbors() {
        let topo = Topology::compute(&line(4, 80.0), 100.0, RoutingProtocol::None);

        assert!(topo.route(NodeId(0), NodeId(1)).is_some());
        assert!(topo.route(NodeId(0), NodeId(2)).is_none());
    }

    #[test]
    fn test_tie_break_lowest_first_hop() {
        // Diamond: 0 reaches 3 through either 1 or 2.
        let positions = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(70.0, 50.0, 0.0),
            Vector3::new(70.0, -50.0, 0.0),
            Vector3::new(140.0, 0.0, 0.0),
        ];
        let topo = Topology::compute(&positions, 100.0, RoutingProtocol::Olsr);

        let route = topo.route(NodeId(0), NodeId(3)).unwrap();
        assert_eq!(route.hops, 2);
        assert_eq!(route.next_hop, NodeId(1));
    }

    #[test]
    fn test_unknown_node() {
        let topo = Topology::compute(&line(2, 10.0), 100.0, RoutingProtocol::Olsr);
        assert!(topo.neighbors_of(NodeId(5)).is_none());
        assert!(topo.route(NodeId(5), NodeId(5)).is_none());
    }

    proptest! {
        #[test]
        fn prop_routes_are_symmetric_and_minimal(
            coords in proptest::collection::vec((0.0f64..300.0, 0.0f64..300.0), 1..12)
        ) {
            let positions: Vec<_> = coords.iter().map(|(x, y)| Vector3::new(*x, *y, 0.0)).collect();
            let topo = Topology::compute(&positions, 100.0, RoutingProtocol::Olsr);
            let n = positions.len() as u32;

            for a in 0..n {
                for &b in topo.neighbors_of(NodeId(a)).unwrap() {
                    prop_assert!(topo.neighbors_of(b).unwrap().contains(&NodeId(a)));
                }
                for b in 0..n {
                    let there = topo.route(NodeId(a), NodeId(b)).map(|r| r.hops);
                    let back = topo.route(NodeId(b), NodeId(a)).map(|r| r.hops);
                    prop_assert_eq!(there, back);

                    if let Some(route) = topo.route(NodeId(a), NodeId(b)) {
                        if route.hops > 0 {
                            // The next hop is a neighbor one link closer.
                            prop_assert!(topo.neighbors_of(NodeId(a)).unwrap().contains(&route.next_hop));
                            let rest = topo.route(route.next_hop, NodeId(b)).unwrap();
                            prop_assert_eq!(rest.hops, route.hops - 1);
                        }
                    }
                }
            }
        }
    }
}
