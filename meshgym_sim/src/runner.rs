//! Run drivers for the two scenario programs.
//!
//! - [`run_adhoc`]: the mesh on its own until the stop time
//! - [`run_gym`]: the mesh plus an environment session stepped by an agent

use crate::agent::{AgentPolicy, LocalAgent};
use crate::bridge::{BridgeStats, EnvironmentSession};
use crate::config::{AdhocConfig, GymConfig};
use crate::env::MeshGymEnv;
use crate::error::SimError;
use crate::scenario::Scenario;
use crate::scheduler::{RunSummary, Scheduler, SchedulerStats};
use crate::seeds::{SeedStreams, Stream};
use crate::traffic::TrafficStats;
use meshgym_env::{AgentTransport, EndReason, ZmqTransport};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Where the agent of a gym run lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSource {
    /// External process listening on a ZeroMQ port
    Zmq { port: u16 },

    /// Thread inside this process
    Local(AgentPolicy),
}

/// Results from one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// "adhoc" or "gym"
    pub mode: &'static str,

    pub global_seed: u64,
    pub run: u64,

    /// Requested stop time in seconds
    pub stop_time_secs: f64,

    /// Clock value when the run halted
    pub final_time_secs: f64,

    /// Halted before the stop time (agent stop or game over)
    pub stopped_early: bool,

    /// Reason sent to the agent (gym runs only)
    pub end_reason: Option<EndReason>,

    pub scheduler: SchedulerStats,

    pub nodes: usize,
    pub links: usize,
    pub course_changes: u64,
    pub routing_refreshes: u64,
    pub redirects: u64,
    pub traffic: TrafficStats,

    /// Step exchange counters (gym runs only)
    pub bridge: Option<BridgeStats>,
}

impl RunReport {
    fn new(
        mode: &'static str,
        seeds: &SeedStreams,
        stop_time: Duration,
        summary: &RunSummary,
        scheduler: &Scheduler<Scenario>,
        scenario: &Scenario,
    ) -> Self {
        Self {
            mode,
            global_seed: seeds.global_seed(),
            run: seeds.run(),
            stop_time_secs: stop_time.as_secs_f64(),
            final_time_secs: summary.final_time.as_secs_f64(),
            stopped_early: summary.stopped_early,
            end_reason: None,
            scheduler: scheduler.stats().clone(),
            nodes: scenario.node_count(),
            links: scenario.link_count(),
            course_changes: scenario.course_changes(),
            routing_refreshes: scenario.routing_refreshes(),
            redirects: scenario.redirects(),
            traffic: scenario.traffic_stats().clone(),
            bridge: None,
        }
    }

    fn log(&self) {
        info!(
            mode = self.mode,
            seed = self.global_seed,
            run = self.run,
            final_time = self.final_time_secs,
            events = self.scheduler.events_processed,
            "Run complete"
        );
        info!(
            sent = self.traffic.sent,
            delivered = self.traffic.delivered,
            dropped = self.traffic.dropped,
            mean_hops = self.traffic.mean_hops(),
            links = self.links,
            "Traffic summary"
        );
        if let Some(bridge) = &self.bridge {
            info!(
                steps = bridge.steps,
                applied = bridge.actions_applied,
                rejected = bridge.actions_rejected,
                "Environment summary"
            );
        }
    }
}

/// Runs the standalone mesh until its stop time.
///
/// The configuration is validated before anything is scheduled.
pub fn run_adhoc(config: &AdhocConfig) -> Result<RunReport, SimError> {
    config.validate()?;
    let stop_time = config.stop_time()?;

    let mut scheduler = Scheduler::new();
    let mut scenario = Scenario::create(config.scenario.clone(), &config.seeds, &mut scheduler)?;

    info!(stop_time = ?stop_time, "Run Simulation.");
    let summary = scheduler.run(stop_time, &mut scenario)?;
    info!("Done.");

    let report = RunReport::new("adhoc", &config.seeds, stop_time, &summary, &scheduler, &scenario);
    report.log();
    Ok(report)
}

/// Runs the mesh with an environment session over `transport`.
///
/// The agent receives exactly one `SimulationEnd` whatever ends the run. A
/// run error takes precedence over a failure to deliver that notice.
pub fn run_gym<T: AgentTransport + 'static>(config: &GymConfig, transport: T) -> Result<RunReport, SimError> {
    config.validate()?;
    let sim_time = config.sim_time()?;
    let step_interval = config.env.step_interval()?;

    let mut scheduler = Scheduler::new();
    let mut scenario = Scenario::create(config.scenario.clone(), &config.seeds, &mut scheduler)?;

    let hooks = MeshGymEnv::new(scenario.node_count(), &config.env);
    let session = EnvironmentSession::open(
        hooks,
        transport,
        step_interval,
        config.env.action_timeout,
        &mut scheduler,
    )?;

    info!(sim_time = ?sim_time, step = ?step_interval, "Run Simulation.");
    let result = scheduler.run(sim_time, &mut scenario);
    session.record_halt(scheduler.now());
    let reason = session.end_reason(&result);
    let notified = session.finish(reason.clone(), &mut scheduler);

    let summary = result?;
    if let Err(e) = &notified {
        warn!(error = %e, "End notice not delivered");
    }
    notified?;
    info!(reason = %reason, "Done.");

    let mut report = RunReport::new("gym", &config.seeds, sim_time, &summary, &scheduler, &scenario);
    report.end_reason = Some(reason);
    report.bridge = Some(session.stats());
    report.log();
    Ok(report)
}

/// Runs a gym session against the agent described by `source`.
pub fn run_gym_with(config: &GymConfig, source: AgentSource) -> Result<RunReport, SimError> {
    match source {
        AgentSource::Zmq { port } => {
            let transport = ZmqTransport::connect(port)?;
            run_gym(config, transport)
        }
        AgentSource::Local(policy) => {
            let (transport, agent) = LocalAgent::spawn(policy, config.seeds.rng(Stream::Agent))?;
            let report = run_gym(config, transport);
            match agent.join() {
                Ok(served) => info!(messages = served, "Local agent finished"),
                Err(e) => warn!(error = %e, "Local agent failed"),
            }
            report
        }
    }
}
