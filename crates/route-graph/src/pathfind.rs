//! Distance-bounded A* pathfinding
//!
//! The heuristic is pure Euclidean distance, never the weighted cost:
//! edge weights are always at least the geometric length of their
//! segment, so the straight-line distance lower-bounds any path's
//! weighted cost and A* stays optimal. A separate running total of
//! geometric distance enforces the maximum conductor reach while
//! expanding, independent of the weighted cost.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use grid_geometry::Point;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::{debug, info};

use crate::graph::RouteGraph;

#[derive(Debug, Clone)]
pub struct PathfinderConfig {
    /// Hard bound on the geometric route length (m).
    pub max_reach_m: f64,
    /// Routed candidates kept after sorting by weight.
    pub max_results: usize,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_reach_m: 400.0,
            max_results: 10,
        }
    }
}

/// One routed candidate.
#[derive(Debug, Clone, Serialize)]
pub struct RoutedPath {
    pub target_pole_id: String,
    pub target_point: Point,
    pub points: Vec<Point>,
    pub length_m: f64,
    pub weight: f64,
    pub reachable: bool,
}

/// Min-heap entry ordered by estimated total weight.
struct HeapItem {
    f: f64,
    node: NodeIndex,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.node == other.node
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.f
            .partial_cmp(&other.f)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.node.index().cmp(&other.node.index()))
    }
}

pub struct Pathfinder<'a> {
    graph: &'a RouteGraph,
    config: PathfinderConfig,
    heuristic_cache: RefCell<HashMap<(NodeIndex, NodeIndex), f64>>,
}

impl<'a> Pathfinder<'a> {
    pub fn new(graph: &'a RouteGraph, config: PathfinderConfig) -> Self {
        Self {
            graph,
            config,
            heuristic_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Route the consumer to every attached candidate, nearest first so
    /// cheap targets are settled before expensive ones. Reachable
    /// results come back sorted by weight, truncated to the configured
    /// maximum.
    pub fn route_all(&self, targets: &[(String, Point, f64)]) -> Vec<RoutedPath> {
        let mut ordered: Vec<&(String, Point, f64)> = targets.iter().collect();
        ordered.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut routed = Vec::new();
        for (pole_id, point, _) in ordered {
            let Some(&target_vertex) = self.graph.pole_vertices.get(pole_id) else {
                continue;
            };
            match self.bounded_astar(
                self.graph.consumer,
                target_vertex,
                &HashSet::new(),
                &HashSet::new(),
            ) {
                Some((vertices, length_m, weight)) => {
                    routed.push(RoutedPath {
                        target_pole_id: pole_id.clone(),
                        target_point: *point,
                        points: self.path_points(&vertices),
                        length_m,
                        weight,
                        reachable: true,
                    });
                }
                None => {
                    debug!("Pole {pole_id} unreachable within the distance bound");
                    routed.push(RoutedPath {
                        target_pole_id: pole_id.clone(),
                        target_point: *point,
                        points: Vec::new(),
                        length_m: f64::INFINITY,
                        weight: f64::INFINITY,
                        reachable: false,
                    });
                }
            }
        }

        let mut reachable: Vec<RoutedPath> =
            routed.into_iter().filter(|p| p.reachable).collect();
        reachable.sort_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal));
        reachable.truncate(self.config.max_results);
        info!("Routed {} candidates within reach", reachable.len());
        reachable
    }

    /// Up to `k` simple paths to one candidate (Yen-style), sorted by
    /// weight and all within the distance bound.
    pub fn k_shortest(&self, pole_id: &str, target_point: Point, k: usize) -> Vec<RoutedPath> {
        let Some(&target_vertex) = self.graph.pole_vertices.get(pole_id) else {
            return Vec::new();
        };
        let Some(first) = self.bounded_astar(
            self.graph.consumer,
            target_vertex,
            &HashSet::new(),
            &HashSet::new(),
        ) else {
            return Vec::new();
        };

        let mut found: Vec<(Vec<NodeIndex>, f64, f64)> = vec![first];
        let mut candidates: Vec<(Vec<NodeIndex>, f64, f64)> = Vec::new();

        while found.len() < k {
            let Some((last_path, _, _)) = found.last().cloned() else {
                break;
            };
            for spur_idx in 0..last_path.len() - 1 {
                let spur_node = last_path[spur_idx];
                let root: Vec<NodeIndex> = last_path[..=spur_idx].to_vec();

                // Ban the edges previous paths take out of this root,
                // and the root's interior vertices
                let mut banned_edges: HashSet<(usize, usize)> = HashSet::new();
                for (path, _, _) in &found {
                    if path.len() > spur_idx + 1 && path[..=spur_idx] == root[..] {
                        banned_edges.insert(edge_key(path[spur_idx], path[spur_idx + 1]));
                    }
                }
                let banned_nodes: HashSet<NodeIndex> =
                    root[..spur_idx].iter().copied().collect();

                let Some((spur_path, _, _)) =
                    self.bounded_astar(spur_node, target_vertex, &banned_edges, &banned_nodes)
                else {
                    continue;
                };

                let mut full: Vec<NodeIndex> = root[..spur_idx].to_vec();
                full.extend(spur_path);
                let Some((length_m, weight)) = self.measure(&full) else {
                    continue;
                };
                if length_m > self.config.max_reach_m {
                    continue;
                }
                if found.iter().any(|(p, _, _)| p == &full)
                    || candidates.iter().any(|(p, _, _)| p == &full)
                {
                    continue;
                }
                candidates.push((full, length_m, weight));
            }

            candidates.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
            if candidates.is_empty() {
                break;
            }
            found.push(candidates.remove(0));
        }

        found
            .into_iter()
            .map(|(vertices, length_m, weight)| RoutedPath {
                target_pole_id: pole_id.to_string(),
                target_point,
                points: self.path_points(&vertices),
                length_m,
                weight,
                reachable: true,
            })
            .collect()
    }

    /// Vertex coordinates with zero-length steps collapsed; connection
    /// edges onto coincident vertices would otherwise produce phantom
    /// bends downstream.
    fn path_points(&self, vertices: &[NodeIndex]) -> Vec<Point> {
        let mut points: Vec<Point> = vertices.iter().map(|&v| self.graph.point_of(v)).collect();
        points.dedup_by(|a, b| a.distance_to(*b) < 1e-9);
        points
    }

    fn heuristic(&self, node: NodeIndex, target: NodeIndex) -> f64 {
        let key = (node, target);
        if let Some(&h) = self.heuristic_cache.borrow().get(&key) {
            return h;
        }
        let h = self
            .graph
            .point_of(node)
            .distance_to(self.graph.point_of(target));
        self.heuristic_cache.borrow_mut().insert(key, h);
        h
    }

    /// A* from `source` to `target`. Neighbours whose cumulative
    /// geometric distance would exceed the reach bound are pruned, so
    /// an out-of-reach target comes back as `None` (unreachable), not
    /// as an over-long path.
    fn bounded_astar(
        &self,
        source: NodeIndex,
        target: NodeIndex,
        banned_edges: &HashSet<(usize, usize)>,
        banned_nodes: &HashSet<NodeIndex>,
    ) -> Option<(Vec<NodeIndex>, f64, f64)> {
        let graph = &self.graph.graph;
        let mut g_weight: HashMap<NodeIndex, f64> = HashMap::new();
        let mut g_dist: HashMap<NodeIndex, f64> = HashMap::new();
        let mut came_from: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue: BinaryHeap<Reverse<HeapItem>> = BinaryHeap::new();

        g_weight.insert(source, 0.0);
        g_dist.insert(source, 0.0);
        queue.push(Reverse(HeapItem {
            f: self.heuristic(source, target),
            node: source,
        }));

        while let Some(Reverse(HeapItem { node, .. })) = queue.pop() {
            if node == target {
                let mut path = vec![node];
                let mut current = node;
                while let Some(&prev) = came_from.get(&current) {
                    path.push(prev);
                    current = prev;
                }
                path.reverse();
                return Some((path, g_dist[&node], g_weight[&node]));
            }

            let node_weight = g_weight[&node];
            let node_dist = g_dist[&node];
            for edge in graph.edges(node) {
                let next = edge.target();
                if banned_nodes.contains(&next) || banned_edges.contains(&edge_key(node, next)) {
                    continue;
                }
                let tentative_dist = node_dist + edge.weight().length_m;
                if tentative_dist > self.config.max_reach_m {
                    continue;
                }
                let tentative_weight = node_weight + edge.weight().weight;
                if tentative_weight < *g_weight.get(&next).unwrap_or(&f64::INFINITY) {
                    g_weight.insert(next, tentative_weight);
                    g_dist.insert(next, tentative_dist);
                    came_from.insert(next, node);
                    queue.push(Reverse(HeapItem {
                        f: tentative_weight + self.heuristic(next, target),
                        node: next,
                    }));
                }
            }
        }
        None
    }

    fn measure(&self, path: &[NodeIndex]) -> Option<(f64, f64)> {
        let graph = &self.graph.graph;
        let mut length = 0.0;
        let mut weight = 0.0;
        for window in path.windows(2) {
            let edge = graph.find_edge(window[0], window[1])?;
            length += graph[edge].length_m;
            weight += graph[edge].weight;
        }
        Some((length, weight))
    }
}

fn edge_key(a: NodeIndex, b: NodeIndex) -> (usize, usize) {
    let (a, b) = (a.index(), b.index());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
