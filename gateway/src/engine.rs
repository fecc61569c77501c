//! Design engine
//!
//! Runs the eight-stage pipeline for one request: tile fetch,
//! preprocessing, candidate selection, road graph construction,
//! pathfinding, crossing validation, pole allocation, and costing.
//! Stage order is strict; pole allocation and costing fan out per
//! path on the blocking pool and re-sort by the final ranking key so
//! output order never depends on task completion order. The earliest
//! hard failure collapses into the request-level response.

use std::sync::Arc;
use std::time::Instant;

use candidate_selector::{SelectorError, TargetPole, TargetSelector};
use crossing_guard::CrossingGuard;
use design_costing::{CapacityValidator, CostCalculator, VoltageCalculator};
use feeder_advisor::FeederAdvisor;
use grid_geometry::Point;
use grid_topology::{PhaseClass, Preprocessor, ProcessedTopology, Transformer};
use pole_allocator::PoleAllocator;
use route_graph::{plan_direct, Pathfinder, RoadGraphBuilder, RouteError};
use tile_fetcher::{FetcherConfig, WfsClient};
use tracing::{info, warn};

use crate::models::{DesignRequest, DesignResponse, DesignStatus, RouteSummary};
use crate::settings::Settings;

pub struct DesignEngine {
    fetcher: WfsClient,
    advisor: Option<FeederAdvisor>,
    settings: Arc<Settings>,
}

/// A path that survived routing and is ready for allocation and
/// costing.
struct PathJob {
    source_pole_id: String,
    source_point: Point,
    points: Vec<Point>,
    length_m: f64,
    fast_track: bool,
    source_voltage: Option<f64>,
    source_is_hv: bool,
    source_phase: Option<PhaseClass>,
    transformer: Option<Transformer>,
}

impl DesignEngine {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let fetcher = WfsClient::new(settings.fetcher.clone())?;
        let advisor = FeederAdvisor::new(settings.advisor.clone()).ok();
        Ok(Self {
            fetcher,
            advisor,
            settings: Arc::new(settings),
        })
    }

    pub fn fetcher(&self) -> &WfsClient {
        &self.fetcher
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Full request path: validate, fetch, preprocess, design.
    pub async fn run(&self, request: &DesignRequest) -> DesignResponse {
        let started = Instant::now();
        let consumer = Point::new(request.x, request.y);
        let load_kw = request.load_kw.unwrap_or(self.settings.default_load_kw);

        if !request.x.is_finite() || !request.y.is_finite() {
            return timed(
                DesignResponse::failure(
                    DesignStatus::Failed,
                    Point::new(0.0, 0.0),
                    None,
                    load_kw,
                    "Malformed consumer coordinate",
                ),
                started,
            );
        }
        let phase = match PhaseClass::parse_request(&request.phase) {
            Ok(phase) => phase,
            Err(e) => {
                return timed(
                    DesignResponse::failure(
                        DesignStatus::Failed,
                        consumer,
                        None,
                        load_kw,
                        e.to_string(),
                    ),
                    started,
                );
            }
        };

        info!(
            "Design request: consumer=({:.1}, {:.1}) phase={:?} load={load_kw}kW",
            consumer.x, consumer.y, phase
        );

        let fetcher = self.fetcher_for(request);
        let tiles = match fetcher.fetch_all(consumer, self.settings.bbox_size_m).await {
            Ok(tiles) => tiles,
            Err(e) => {
                warn!("Tile fetch failed: {e}");
                return timed(
                    DesignResponse::failure(
                        DesignStatus::Failed,
                        consumer,
                        Some(phase),
                        load_kw,
                        format!("Facility fetch failed: {e}"),
                    ),
                    started,
                );
            }
        };

        let topology = Preprocessor::new(self.settings.preprocess.clone()).process(&tiles);
        let response = match self.design(&topology, consumer, phase, load_kw).await {
            Ok(routes) => DesignResponse::success(consumer, phase, load_kw, routes),
            Err((status, reason)) => {
                DesignResponse::failure(status, consumer, Some(phase), load_kw, reason)
            }
        };
        timed(response, started)
    }

    /// Per-request server overrides get their own client; everything
    /// else shares the process-wide one.
    fn fetcher_for(&self, request: &DesignRequest) -> WfsClient {
        if request.gis_url.is_none() && request.base_url.is_none() {
            return self.fetcher.clone();
        }
        let mut config: FetcherConfig = self.settings.fetcher.clone();
        if let Some(url) = &request.gis_url {
            config.gis_url = url.clone();
        }
        if let Some(url) = &request.base_url {
            config.base_url = url.clone();
        }
        WfsClient::new(config).unwrap_or_else(|_| self.fetcher.clone())
    }

    /// Stages S3-S8 over an already processed topology.
    pub async fn design(
        &self,
        topology: &ProcessedTopology,
        consumer: Point,
        phase: PhaseClass,
        load_kw: f64,
    ) -> Result<Vec<RouteSummary>, (DesignStatus, String)> {
        if topology.poles.is_empty() {
            return Err((
                DesignStatus::NoRoute,
                "No usable poles in the working area".to_string(),
            ));
        }

        // S3: candidate selection
        let selection = TargetSelector::new(topology, self.settings.selector.clone())
            .select(consumer, phase)
            .map_err(|e| match e {
                SelectorError::NoEligiblePoles(_) | SelectorError::NoneInReach { .. } => {
                    (DesignStatus::NoRoute, e.to_string())
                }
            })?;

        // S4 + S5: road routing, with fast-track candidates bypassing
        // the road graph entirely
        let mut jobs = self.fast_track_jobs(topology, consumer, &selection.targets);
        if topology.roads.is_empty() {
            if jobs.is_empty() {
                jobs = self.direct_jobs(topology, consumer, &selection.targets);
            }
            if jobs.is_empty() {
                return Err((
                    DesignStatus::NoRoute,
                    "No roads in the working area and no direct connection is possible"
                        .to_string(),
                ));
            }
        } else {
            match self.routed_jobs(topology, consumer, &selection.targets) {
                Ok(mut routed) => jobs.append(&mut routed),
                Err(reason) if jobs.is_empty() => {
                    return Err((DesignStatus::NoRoute, reason));
                }
                Err(reason) => info!("Road routing unavailable, fast-track only: {reason}"),
            }
        }
        if jobs.is_empty() {
            return Err((
                DesignStatus::NoRoute,
                format!(
                    "No route within {:.0}m of the consumer",
                    self.settings.pathfinder.max_reach_m
                ),
            ));
        }

        // S6: conductor crossing validation
        let guard = CrossingGuard::new(topology, self.settings.crossing.clone());
        let mut last_offender: Option<String> = None;
        let jobs: Vec<PathJob> = jobs
            .into_iter()
            .filter(|job| {
                let report = guard.validate_path(&job.points, phase);
                if let Some(crossing) = report.crossings.first() {
                    last_offender = Some(crossing.line_id.clone());
                }
                report.clear
            })
            .collect();
        if jobs.is_empty() {
            let offender = last_offender.unwrap_or_else(|| "unknown".to_string());
            return Err((
                DesignStatus::NoRoute,
                format!("Every candidate route crosses an existing conductor (last: {offender})"),
            ));
        }

        // S7 + S8: allocation and costing fan out per path; results are
        // re-sorted by the ranking key after the join
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let settings = self.settings.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                finalise_route(job, phase, load_kw, &settings)
            }));
        }
        let mut routes = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(route) => routes.push(route),
                Err(e) => {
                    return Err((
                        DesignStatus::Failed,
                        format!("Route finalisation failed: {e}"),
                    ));
                }
            }
        }

        routes.sort_by(|a, b| {
            a.cost_index.cmp(&b.cost_index).then(
                a.total_distance_m
                    .partial_cmp(&b.total_distance_m)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        for (i, route) in routes.iter_mut().enumerate() {
            route.rank = i + 1;
        }

        self.annotate_duplicate_feeders(&mut routes).await;

        info!("Design complete: {} ranked routes", routes.len());
        Ok(routes)
    }

    fn job_for(
        &self,
        topology: &ProcessedTopology,
        target: &TargetPole,
        points: Vec<Point>,
        length_m: f64,
        fast_track: bool,
    ) -> PathJob {
        PathJob {
            source_pole_id: target.id().to_string(),
            source_point: target.point(),
            points,
            length_m,
            fast_track,
            source_voltage: target.pole.voltage,
            source_is_hv: target.pole.is_high_voltage(),
            source_phase: target.pole.phase,
            transformer: topology.transformer_on_pole(target.id()).cloned(),
        }
    }

    fn fast_track_jobs(
        &self,
        topology: &ProcessedTopology,
        consumer: Point,
        targets: &[TargetPole],
    ) -> Vec<PathJob> {
        targets
            .iter()
            .filter(|t| t.fast_track)
            .map(|target| {
                self.job_for(
                    topology,
                    target,
                    vec![consumer, target.point()],
                    target.distance_m,
                    true,
                )
            })
            .collect()
    }

    /// Without roads, nearby candidates can still be reached with a
    /// building-avoiding direct conductor.
    fn direct_jobs(
        &self,
        topology: &ProcessedTopology,
        consumer: Point,
        targets: &[TargetPole],
    ) -> Vec<PathJob> {
        targets
            .iter()
            .filter(|t| !t.fast_track && t.distance_m <= self.settings.selector.fast_track_m)
            .filter_map(|target| {
                let path = plan_direct(consumer, target.point(), &topology.buildings)?;
                let length = grid_geometry::polyline_length(&path);
                if length > self.settings.pathfinder.max_reach_m {
                    return None;
                }
                Some(self.job_for(topology, target, path, length, false))
            })
            .collect()
    }

    fn routed_jobs(
        &self,
        topology: &ProcessedTopology,
        consumer: Point,
        targets: &[TargetPole],
    ) -> Result<Vec<PathJob>, String> {
        let candidates: Vec<(String, Point)> = targets
            .iter()
            .filter(|t| !t.fast_track)
            .map(|t| (t.id().to_string(), t.point()))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let graph = RoadGraphBuilder::new(self.settings.graph.clone())
            .build(&topology.roads, consumer, &candidates)
            .map_err(|e| match e {
                RouteError::NoRoads | RouteError::ConsumerUnreachable { .. } => e.to_string(),
                RouteError::NoPath(id) => format!("No route to pole {id}"),
            })?;

        let pathfinder = Pathfinder::new(&graph, self.settings.pathfinder.clone());
        let query: Vec<(String, Point, f64)> = targets
            .iter()
            .filter(|t| !t.fast_track)
            .map(|t| (t.id().to_string(), t.point(), t.distance_m))
            .collect();
        let routed = pathfinder.route_all(&query);

        Ok(routed
            .into_iter()
            .filter(|path| path.reachable)
            .filter_map(|path| {
                let target = targets.iter().find(|t| t.id() == path.target_pole_id)?;
                Some(self.job_for(topology, target, path.points, path.length_m, false))
            })
            .collect())
    }

    /// Advisory only: annotate, never remove.
    async fn annotate_duplicate_feeders(&self, routes: &mut [RouteSummary]) {
        let Some(advisor) = &self.advisor else {
            return;
        };
        let top: Vec<String> = routes
            .iter()
            .take(self.settings.advisory_top_k)
            .map(|r| r.source_pole_id.clone())
            .collect();
        if top.len() < 2 {
            return;
        }
        let report = advisor.check_duplicates(&top).await;
        if !report.has_duplicates() {
            return;
        }
        for route in routes.iter_mut() {
            if report.duplicates.contains(&route.source_pole_id) {
                let feeder = report
                    .feeders
                    .get(&route.source_pole_id)
                    .cloned()
                    .unwrap_or_default();
                let note = format!("shares feeder {feeder} with another candidate");
                route.remark = Some(match route.remark.take() {
                    Some(remark) => format!("{remark} | {note}"),
                    None => note,
                });
            }
        }
    }
}

/// S7 + S8 for one surviving path. Pure CPU work, run on the blocking
/// pool.
fn finalise_route(
    job: PathJob,
    phase: PhaseClass,
    load_kw: f64,
    settings: &Settings,
) -> RouteSummary {
    let allocator = PoleAllocator::new(settings.allocator.clone());
    let allocation = allocator.allocate(&job.points, job.fast_track);

    let calculator = CostCalculator::new(settings.cost.clone());
    let breakdown = calculator.itemised(
        allocation.new_poles.len(),
        allocation.wire_length_m,
        allocation.turn_count,
        phase,
    );
    let cost_index = calculator.cost_index(
        allocation.new_poles.len(),
        job.length_m,
        allocation.turn_count,
        job.fast_track,
    );

    let voltage = VoltageCalculator::new(settings.voltage.clone());
    let (wire, voltage_drop) = voltage.recommend(job.length_m, load_kw, phase, job.source_voltage);

    let capacity = job
        .transformer
        .as_ref()
        .map(|t| CapacityValidator::new(settings.capacity.clone()).validate(t, 0.0, load_kw));

    let remark = if job.fast_track {
        Some(format!(
            "Fast-Track: direct connection over {:.0}m",
            job.length_m
        ))
    } else {
        None
    };

    RouteSummary {
        rank: 0, // assigned after the deterministic re-sort
        cost_index,
        total_cost: breakdown.total,
        total_distance_m: job.length_m,
        source_pole_id: job.source_pole_id,
        source_pole_coord: [job.source_point.x, job.source_point.y],
        source_voltage_class: if job.source_is_hv { "HV" } else { "LV" }.to_string(),
        source_phase: job.source_phase,
        new_pole_count: allocation.new_poles.len(),
        new_poles: allocation.new_poles,
        path: job.points.iter().map(|p| [p.x, p.y]).collect(),
        turn_count: allocation.turn_count,
        wire_spec: wire.as_str(),
        breakdown,
        voltage_drop,
        capacity,
        fast_track: job.fast_track,
        remark,
    }
}

fn timed(mut response: DesignResponse, started: Instant) -> DesignResponse {
    response.processing_time_ms = started.elapsed().as_millis() as u64;
    response
}
