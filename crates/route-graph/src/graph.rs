//! Road graph construction
//!
//! Road centrelines become edges, short gaps between dangling ends are
//! snapped, and the consumer plus each candidate pole is attached to
//! the nearest point of the network, splitting the underlying edge
//! when the attachment lands mid-segment.

use std::collections::HashMap;

use grid_geometry::{nearest_point_on_segment, Point, PointIndex};
use grid_topology::Road;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use tracing::{debug, info, warn};

use crate::{GraphConfig, Result, RouteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    Road,
    Junction,
    Consumer,
    Pole,
}

#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub point: Point,
    pub kind: VertexKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Road,
    Snap,
    Connection,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeAttr {
    pub length_m: f64,
    pub weight: f64,
    pub kind: EdgeKind,
}

/// The attached road network for one design request.
#[derive(Debug)]
pub struct RouteGraph {
    pub graph: UnGraph<Vertex, EdgeAttr>,
    pub consumer: NodeIndex,
    /// Candidate pole id -> graph vertex. A missing entry means the
    /// pole could not be attached to the road network.
    pub pole_vertices: HashMap<String, NodeIndex>,
    pub config: GraphConfig,
}

impl RouteGraph {
    pub fn point_of(&self, node: NodeIndex) -> Point {
        self.graph[node].point
    }
}

pub struct RoadGraphBuilder {
    config: GraphConfig,
    graph: UnGraph<Vertex, EdgeAttr>,
    vertex_index: PointIndex<NodeIndex>,
}

impl RoadGraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            graph: UnGraph::new_undirected(),
            vertex_index: PointIndex::new(),
        }
    }

    /// Build the attached graph. `candidates` are `(pole id, point)`
    /// pairs; unattachable candidates are dropped from routing, an
    /// unattachable consumer fails the design.
    pub fn build(
        mut self,
        roads: &[Road],
        consumer: Point,
        candidates: &[(String, Point)],
    ) -> Result<RouteGraph> {
        if roads.is_empty() {
            return Err(RouteError::NoRoads);
        }

        for road in roads {
            self.add_road(road);
        }
        info!(
            "Road graph: {} vertices, {} edges from {} roads",
            self.graph.node_count(),
            self.graph.edge_count(),
            roads.len()
        );

        let snapped = self.snap_dangling_ends();
        if snapped > 0 {
            info!("Snapped {snapped} disconnected road endpoints");
        }

        let consumer_vertex = self
            .attach_point(consumer, VertexKind::Consumer)
            .map_err(|distance_m| RouteError::ConsumerUnreachable {
                distance_m,
                limit_m: self.config.road_access_m,
            })?;

        let mut pole_vertices = HashMap::new();
        for (pole_id, point) in candidates {
            match self.attach_point(*point, VertexKind::Pole) {
                Ok(vertex) => {
                    pole_vertices.insert(pole_id.clone(), vertex);
                }
                Err(distance_m) => {
                    warn!(
                        "Candidate {pole_id} is {distance_m:.1}m from the road network, dropped"
                    );
                }
            }
        }

        Ok(RouteGraph {
            graph: self.graph,
            consumer: consumer_vertex,
            pole_vertices,
            config: self.config,
        })
    }

    fn add_road(&mut self, road: &Road) {
        for window in road.points.windows(2) {
            let a = self.get_or_create_vertex(window[0], VertexKind::Road);
            let b = self.get_or_create_vertex(window[1], VertexKind::Road);
            if a == b {
                continue;
            }
            let length = self.graph[a].point.distance_to(self.graph[b].point);
            self.add_edge_once(a, b, length, EdgeKind::Road);
        }
    }

    fn get_or_create_vertex(&mut self, point: Point, kind: VertexKind) -> NodeIndex {
        if let Some(&existing) = self
            .vertex_index
            .nearest_within(point, self.config.vertex_merge_m)
        {
            return existing;
        }
        let node = self.graph.add_node(Vertex { point, kind });
        self.vertex_index.insert(point, node);
        node
    }

    fn add_edge_once(&mut self, a: NodeIndex, b: NodeIndex, length_m: f64, kind: EdgeKind) {
        if self.graph.find_edge(a, b).is_some() {
            return;
        }
        self.graph.add_edge(
            a,
            b,
            EdgeAttr {
                length_m,
                weight: self.config.edge_weight(length_m),
                kind,
            },
        );
    }

    /// Connect pairs of degree-1 vertices that sit within the snap
    /// distance of each other.
    fn snap_dangling_ends(&mut self) -> usize {
        let dangling: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| self.graph.edges(n).count() == 1)
            .collect();

        let mut snapped = 0;
        for (i, &a) in dangling.iter().enumerate() {
            for &b in &dangling[i + 1..] {
                let distance = self.graph[a].point.distance_to(self.graph[b].point);
                if distance <= self.config.road_snap_m && self.graph.find_edge(a, b).is_none() {
                    debug!(
                        "Snap edge {:?} - {:?} ({distance:.1}m)",
                        self.graph[a].point, self.graph[b].point
                    );
                    self.add_edge_once(a, b, distance, EdgeKind::Snap);
                    snapped += 1;
                }
            }
        }
        snapped
    }

    /// Attach an off-network point to the nearest road edge. Returns
    /// the new vertex, or the offending distance when the network is
    /// out of reach.
    fn attach_point(
        &mut self,
        point: Point,
        kind: VertexKind,
    ) -> std::result::Result<NodeIndex, f64> {
        // Nearest point over every road/snap edge
        let mut best: Option<(petgraph::graph::EdgeIndex, NodeIndex, NodeIndex, Point, f64)> =
            None;
        for edge in self.graph.edge_references() {
            if !matches!(edge.weight().kind, EdgeKind::Road | EdgeKind::Snap) {
                continue;
            }
            let a = self.graph[edge.source()].point;
            let b = self.graph[edge.target()].point;
            let candidate = nearest_point_on_segment(point, a, b);
            let distance = point.distance_to(candidate);
            if best.map_or(true, |(_, _, _, _, bd)| distance < bd) {
                best = Some((edge.id(), edge.source(), edge.target(), candidate, distance));
            }
        }

        let Some((edge_id, u, v, on_road, distance)) = best else {
            return Err(f64::INFINITY);
        };
        if distance > self.config.road_access_m {
            return Err(distance);
        }

        let attach_vertex = self.attachment_vertex(edge_id, u, v, on_road);
        let point_vertex = self.graph.add_node(Vertex { point, kind });
        self.vertex_index.insert(point, point_vertex);
        self.add_edge_once(point_vertex, attach_vertex, distance, EdgeKind::Connection);
        Ok(point_vertex)
    }

    /// Vertex to hang a connection edge off: an existing endpoint when
    /// the attachment lands within the merge tolerance, otherwise a new
    /// junction splitting the edge in two.
    fn attachment_vertex(
        &mut self,
        edge_id: petgraph::graph::EdgeIndex,
        u: NodeIndex,
        v: NodeIndex,
        on_road: Point,
    ) -> NodeIndex {
        for endpoint in [u, v] {
            if self.graph[endpoint].point.distance_to(on_road) <= self.config.vertex_merge_m {
                return endpoint;
            }
        }

        let kind = self.graph[edge_id].kind;
        self.graph.remove_edge(edge_id);

        let junction = self.graph.add_node(Vertex {
            point: on_road,
            kind: VertexKind::Junction,
        });
        self.vertex_index.insert(on_road, junction);

        let to_u = on_road.distance_to(self.graph[u].point);
        let to_v = on_road.distance_to(self.graph[v].point);
        self.add_edge_once(junction, u, to_u, kind);
        self.add_edge_once(junction, v, to_v, kind);
        junction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn road(id: &str, points: Vec<Point>) -> Road {
        Road {
            id: id.to_string(),
            points,
            category: None,
        }
    }

    fn straight_road() -> Vec<Road> {
        vec![road(
            "R1",
            vec![Point::new(0.0, 0.0), Point::new(200.0, 0.0)],
        )]
    }

    #[test]
    fn test_attach_by_edge_split() {
        let graph = RoadGraphBuilder::new(GraphConfig::default())
            .build(
                &straight_road(),
                Point::new(0.0, 0.0),
                &[("P1".to_string(), Point::new(120.0, 5.0))],
            )
            .unwrap();

        // Pole hangs off a junction that split the road edge
        let pole_vertex = graph.pole_vertices["P1"];
        assert_eq!(graph.graph[pole_vertex].kind, VertexKind::Pole);
        let junction_count = graph
            .graph
            .node_indices()
            .filter(|&n| graph.graph[n].kind == VertexKind::Junction)
            .count();
        assert_eq!(junction_count, 1);
    }

    #[test]
    fn test_consumer_on_existing_vertex_reuses_it() {
        let graph = RoadGraphBuilder::new(GraphConfig::default())
            .build(&straight_road(), Point::new(0.5, 0.0), &[])
            .unwrap();

        // Connection lands within 1m of the road's first vertex, so no
        // junction is created
        let junction_count = graph
            .graph
            .node_indices()
            .filter(|&n| graph.graph[n].kind == VertexKind::Junction)
            .count();
        assert_eq!(junction_count, 0);
    }

    #[test]
    fn test_consumer_out_of_reach_fails() {
        let err = RoadGraphBuilder::new(GraphConfig::default())
            .build(&straight_road(), Point::new(100.0, 150.0), &[])
            .unwrap_err();
        assert!(matches!(err, RouteError::ConsumerUnreachable { .. }));
    }

    #[test]
    fn test_unreachable_candidate_is_dropped_not_fatal() {
        let graph = RoadGraphBuilder::new(GraphConfig::default())
            .build(
                &straight_road(),
                Point::new(0.0, 0.0),
                &[
                    ("NEAR".to_string(), Point::new(100.0, 5.0)),
                    ("FAR".to_string(), Point::new(100.0, 300.0)),
                ],
            )
            .unwrap();
        assert!(graph.pole_vertices.contains_key("NEAR"));
        assert!(!graph.pole_vertices.contains_key("FAR"));
    }

    #[test]
    fn test_dangling_ends_snap() {
        let roads = vec![
            road("A", vec![Point::new(0.0, 0.0), Point::new(95.0, 0.0)]),
            road("B", vec![Point::new(103.0, 0.0), Point::new(200.0, 0.0)]),
        ];
        let graph = RoadGraphBuilder::new(GraphConfig::default())
            .build(&roads, Point::new(0.0, 0.0), &[])
            .unwrap();

        let snap_edges = graph
            .graph
            .edge_references()
            .filter(|e| e.weight().kind == EdgeKind::Snap)
            .count();
        assert_eq!(snap_edges, 1);
    }

    #[test]
    fn test_gap_beyond_snap_distance_stays_open() {
        let roads = vec![
            road("A", vec![Point::new(0.0, 0.0), Point::new(80.0, 0.0)]),
            road("B", vec![Point::new(95.0, 0.0), Point::new(200.0, 0.0)]),
        ];
        let graph = RoadGraphBuilder::new(GraphConfig::default())
            .build(&roads, Point::new(0.0, 0.0), &[])
            .unwrap();

        let snap_edges = graph
            .graph
            .edge_references()
            .filter(|e| e.weight().kind == EdgeKind::Snap)
            .count();
        assert_eq!(snap_edges, 0);
    }

    #[test]
    fn test_vertex_coalescing_welds_shared_endpoints() {
        // Two roads meeting at almost the same coordinate
        let roads = vec![
            road("A", vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]),
            road("B", vec![Point::new(100.3, 0.2), Point::new(100.0, 100.0)]),
        ];
        let graph = RoadGraphBuilder::new(GraphConfig::default())
            .build(&roads, Point::new(0.0, 0.0), &[])
            .unwrap();

        // 3 road vertices (shared corner welded) + consumer
        let road_vertices = graph
            .graph
            .node_indices()
            .filter(|&n| graph.graph[n].kind == VertexKind::Road)
            .count();
        assert_eq!(road_vertices, 3);
    }

    #[test]
    fn test_edge_weight_exceeds_length() {
        let config = GraphConfig::default();
        // 40m of edge carries one amortised pole on top of its length
        assert!((config.edge_weight(40.0) - (40.0 + 5000.0)).abs() < 1e-9);
        assert!(config.edge_weight(10.0) > 10.0);
    }
}
