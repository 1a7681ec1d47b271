//! Per-tick control flow.
//!
//! Exactly one layer acts per tick, in priority order: a firing instinct rule,
//! then the active chain, then the planner. An escalation produced by the
//! chain layer is held and handed to the planner on the following tick.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::chain::Step;
use super::clock::Clock;
use super::config::EngineConfig;
use super::context::EngineContext;
use super::custom_chains::ChainLibrary;
use super::escalation::{EscalationReport, PlanRequest, Planner, PlannerDirective};
use super::executor::{ChainExecutor, StartStatus, TickOutcome, TickResult};
use super::gateway::ActionGateway;
use super::instinct::{InstinctLayer, InstinctOutcome};
use super::memory::{error_keyword, ExperienceMemory, ExperienceStore};
use super::operation::Operation;
use super::snapshot::{ThreatSnapshot, WorldSnapshot};
use super::types::{ChainName, ItemName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlLayer {
    Instinct,
    Chain,
    Planner,
    /// Nothing acted: the world was unreadable or the planner said wait.
    Observe,
}

impl ControlLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlLayer::Instinct => "instinct",
            ControlLayer::Chain => "chain",
            ControlLayer::Planner => "planner",
            ControlLayer::Observe => "observe",
        }
    }
}

impl fmt::Display for ControlLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the planner's directive did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveOutcome {
    pub directive: &'static str,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlResult {
    Instinct(InstinctOutcome),
    Chain(TickResult),
    Planner(DirectiveOutcome),
    Idle(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlTick {
    pub tick: u64,
    pub layer: ControlLayer,
    pub result: ControlResult,
}

impl ControlTick {
    pub fn success(&self) -> bool {
        match &self.result {
            ControlResult::Instinct(outcome) => outcome.success,
            ControlResult::Chain(result) => result.success,
            ControlResult::Planner(outcome) => outcome.success,
            ControlResult::Idle(_) => true,
        }
    }

    pub fn chain_result(&self) -> Option<&TickResult> {
        match &self.result {
            ControlResult::Chain(result) => Some(result),
            _ => None,
        }
    }
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerMetrics {
    pub total_ticks: u64,
    pub instinct_ticks: u64,
    pub chain_ticks: u64,
    pub planner_ticks: u64,
    pub idle_ticks: u64,
    pub chains_started: u64,
    pub chains_completed: u64,
    pub chains_cancelled: u64,
    pub escalations: u64,
    pub learned_solutions: u64,
    pub planner_errors: u64,
}

impl ControllerMetrics {
    fn record_layer(&mut self, layer: ControlLayer) {
        self.total_ticks += 1;
        match layer {
            ControlLayer::Instinct => self.instinct_ticks += 1,
            ControlLayer::Chain => self.chain_ticks += 1,
            ControlLayer::Planner => self.planner_ticks += 1,
            ControlLayer::Observe => self.idle_ticks += 1,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "ticks={} (instinct={} chain={} planner={} idle={}) chains started={} completed={} cancelled={} escalations={} learned={}",
            self.total_ticks,
            self.instinct_ticks,
            self.chain_ticks,
            self.planner_ticks,
            self.idle_ticks,
            self.chains_started,
            self.chains_completed,
            self.chains_cancelled,
            self.escalations,
            self.learned_solutions,
        )
    }
}

// ============================================================================
// Controller
// ============================================================================

pub struct AgentController<G: ActionGateway, C: Clock, P: Planner> {
    gateway: G,
    clock: C,
    planner: P,
    config: EngineConfig,
    experience: Box<dyn ExperienceStore>,
    library: ChainLibrary,
    instinct: InstinctLayer,
    executor: ChainExecutor,
    pending: Option<EscalationReport>,
    metrics: ControllerMetrics,
}

impl<G: ActionGateway, C: Clock, P: Planner> AgentController<G, C, P> {
    /// Controller with in-memory experience and the built-in chain library.
    pub fn new(gateway: G, clock: C, planner: P, config: EngineConfig) -> Self {
        Self {
            experience: Box::new(ExperienceMemory::in_memory(&config)),
            library: ChainLibrary::default(),
            instinct: InstinctLayer::new(config.clone()),
            executor: ChainExecutor::new(),
            pending: None,
            metrics: ControllerMetrics::default(),
            gateway,
            clock,
            planner,
            config,
        }
    }

    pub fn with_experience(mut self, experience: Box<dyn ExperienceStore>) -> Self {
        self.experience = experience;
        self
    }

    pub fn with_library(mut self, library: ChainLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn experience(&self) -> &dyn ExperienceStore {
        self.experience.as_ref()
    }

    pub fn library(&self) -> &ChainLibrary {
        &self.library
    }

    pub fn executor(&self) -> &ChainExecutor {
        &self.executor
    }

    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    /// Escalation waiting for the planner's next turn.
    pub fn pending_escalation(&self) -> Option<&EscalationReport> {
        self.pending.as_ref()
    }

    /// Starts `name` directly, replacing any active chain.
    pub fn start_chain(&mut self, name: &str, overrides: &BTreeMap<ItemName, u32>) -> StartStatus {
        let ctx = EngineContext {
            gateway: &self.gateway,
            clock: &self.clock,
            experience: self.experience.as_mut(),
            library: &mut self.library,
            config: &self.config,
        };
        let status = self.executor.start(&ctx, name, overrides);
        if status.is_started() {
            self.metrics.chains_started += 1;
        }
        status
    }

    pub fn tick(&mut self) -> ControlTick {
        let (layer, result) = self.step();
        self.metrics.record_layer(layer);
        debug!(tick = self.metrics.total_ticks, layer = %layer, "control tick");
        ControlTick {
            tick: self.metrics.total_ticks,
            layer,
            result,
        }
    }

    /// Ticks every `interval` until `stop` is set or `max_ticks` ran.
    /// Returns the number of ticks run.
    pub fn run(&mut self, max_ticks: Option<u64>, interval: Duration, stop: &AtomicBool) -> u64 {
        let mut ran = 0;
        while !stop.load(Ordering::SeqCst) {
            if max_ticks.is_some_and(|max| ran >= max) {
                break;
            }
            let tick = self.tick();
            ran += 1;
            if !tick.success() {
                debug!(tick = tick.tick, layer = %tick.layer, "tick did not succeed");
            }
            self.clock.sleep(interval);
        }
        info!(ticks = ran, summary = %self.metrics.summary(), "control loop stopped");
        ran
    }

    fn step(&mut self) -> (ControlLayer, ControlResult) {
        let world = match self.gateway.world_snapshot() {
            Ok(world) => world,
            Err(err) => {
                warn!(error = %err, "world snapshot unavailable, skipping tick");
                return (
                    ControlLayer::Observe,
                    ControlResult::Idle(format!("world snapshot unavailable: {err}")),
                );
            }
        };

        if let Some(outcome) = self.run_instinct(&world) {
            return (ControlLayer::Instinct, ControlResult::Instinct(outcome));
        }

        if self.executor.has_active() {
            let result = self.run_chain();
            return (ControlLayer::Chain, ControlResult::Chain(result));
        }

        self.consult_planner(&world)
    }

    fn run_instinct(&mut self, world: &WorldSnapshot) -> Option<InstinctOutcome> {
        let threat = self.gateway.threat_assessment().unwrap_or_else(|err| {
            debug!(error = %err, "threat assessment failed, assuming safe");
            ThreatSnapshot::safe()
        });
        let now = self.clock.now();
        let action = self.instinct.evaluate(world, &threat, now)?;
        let outcome = self.instinct.fire(&action, &self.gateway, now);
        if outcome.success {
            let mut ctx = EngineContext {
                gateway: &self.gateway,
                clock: &self.clock,
                experience: self.experience.as_mut(),
                library: &mut self.library,
                config: &self.config,
            };
            ctx.remember_site(&outcome.operation);
        }
        Some(outcome)
    }

    fn run_chain(&mut self) -> TickResult {
        let mut ctx = EngineContext {
            gateway: &self.gateway,
            clock: &self.clock,
            experience: self.experience.as_mut(),
            library: &mut self.library,
            config: &self.config,
        };
        let result = self.executor.tick(&mut ctx);
        if let Some(report) = &result.escalation {
            self.metrics.chains_cancelled += 1;
            self.metrics.escalations += 1;
            self.pending = Some(report.clone());
        } else if result.outcome == TickOutcome::Completed {
            self.metrics.chains_completed += 1;
        }
        result
    }

    fn consult_planner(&mut self, world: &WorldSnapshot) -> (ControlLayer, ControlResult) {
        let escalation = self.pending.take();
        let chains = self.library.names();
        let request = PlanRequest {
            escalation: escalation.as_ref(),
            world,
            chains: &chains,
        };
        let directive = match self.planner.plan(&request) {
            Ok(directive) => directive,
            Err(err) => {
                warn!(error = %err, "planner unavailable, escalation kept for next tick");
                self.metrics.planner_errors += 1;
                self.pending = escalation;
                return (
                    ControlLayer::Planner,
                    ControlResult::Planner(DirectiveOutcome {
                        directive: "error",
                        success: false,
                        message: err.to_string(),
                    }),
                );
            }
        };

        if directive == PlannerDirective::Wait {
            return (
                ControlLayer::Observe,
                ControlResult::Idle("planner asked to wait".to_string()),
            );
        }
        let outcome = self.apply_directive(directive, escalation.as_ref());
        (ControlLayer::Planner, ControlResult::Planner(outcome))
    }

    fn apply_directive(
        &mut self,
        directive: PlannerDirective,
        escalation: Option<&EscalationReport>,
    ) -> DirectiveOutcome {
        match directive {
            PlannerDirective::StartChain { chain, items } => {
                let status = self.start_chain(&chain, &items);
                DirectiveOutcome {
                    directive: "start_chain",
                    success: status.is_started(),
                    message: status.to_string(),
                }
            }
            PlannerDirective::ToolCalls { calls } => self.run_tool_calls(calls, escalation),
            PlannerDirective::DefineChain {
                name,
                description,
                steps,
                start,
            } => self.define_chain(name, &description, steps, start),
            PlannerDirective::Wait => DirectiveOutcome {
                directive: "wait",
                success: true,
                message: "waiting".to_string(),
            },
        }
    }

    /// Runs corrective calls in order, stopping at the first failure. When all
    /// succeed after an escalation that named a failing operation, the calls
    /// are stored as the fix for that error.
    fn run_tool_calls(
        &mut self,
        calls: Vec<Operation>,
        escalation: Option<&EscalationReport>,
    ) -> DirectiveOutcome {
        let mut ctx = EngineContext {
            gateway: &self.gateway,
            clock: &self.clock,
            experience: self.experience.as_mut(),
            library: &mut self.library,
            config: &self.config,
        };
        let mut messages = Vec::with_capacity(calls.len());
        for call in &calls {
            let outcome = ctx.gateway.execute(call);
            messages.push(format!("{call}: {}", outcome.message));
            if !outcome.success {
                warn!(operation = %call, message = %outcome.message, "planner tool call failed");
                return DirectiveOutcome {
                    directive: "tool_calls",
                    success: false,
                    message: messages.join("; "),
                };
            }
            ctx.remember_site(call);
        }

        let failed = escalation.and_then(|report| {
            let operation = report.detail.operation.as_ref()?;
            let error = report.detail.error.as_deref()?;
            Some((operation.name(), error_keyword(error)))
        });
        if let Some((operation, keyword)) = failed {
            if !calls.is_empty() && !keyword.is_empty() {
                let steps = calls.iter().cloned().map(Step::action).collect();
                let now = ctx.unix_time();
                ctx.experience
                    .record_error_solution(operation, &keyword, steps, now);
                self.metrics.learned_solutions += 1;
                info!(operation, keyword = %keyword, calls = calls.len(), "learned error solution");
            }
        }

        DirectiveOutcome {
            directive: "tool_calls",
            success: true,
            message: messages.join("; "),
        }
    }

    fn define_chain(
        &mut self,
        name: ChainName,
        description: &str,
        steps: Vec<Step>,
        start: bool,
    ) -> DirectiveOutcome {
        if let Err(err) = self.library.save_chain(&name, description, steps) {
            warn!(chain = %name, error = %err, "planner chain rejected");
            return DirectiveOutcome {
                directive: "define_chain",
                success: false,
                message: err.to_string(),
            };
        }
        if !start {
            return DirectiveOutcome {
                directive: "define_chain",
                success: true,
                message: format!("saved chain {name}"),
            };
        }
        let status = self.start_chain(&name, &BTreeMap::new());
        DirectiveOutcome {
            directive: "define_chain",
            success: status.is_started(),
            message: format!("saved chain {name}; {status}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::PlannerError;
    use crate::engine::escalation::{EscalationReason, QueuePlanner};
    use crate::engine::test_support::{ManualClock, MockGateway};
    use std::collections::VecDeque;

    /// Replays directives in order and remembers which requests carried an escalation.
    #[derive(Default)]
    struct ScriptedPlanner {
        directives: VecDeque<PlannerDirective>,
        escalations: Vec<Option<EscalationReason>>,
    }

    impl ScriptedPlanner {
        fn new(directives: Vec<PlannerDirective>) -> Self {
            Self {
                directives: directives.into(),
                escalations: Vec::new(),
            }
        }
    }

    impl Planner for ScriptedPlanner {
        fn plan(&mut self, request: &PlanRequest<'_>) -> Result<PlannerDirective, PlannerError> {
            self.escalations
                .push(request.escalation.map(|report| report.reason));
            self.directives.pop_front().ok_or(PlannerError::Http {
                message: "planner offline".to_string(),
            })
        }
    }

    fn start(chain: &str) -> PlannerDirective {
        PlannerDirective::StartChain {
            chain: chain.to_string(),
            items: BTreeMap::new(),
        }
    }

    fn controller<P: Planner>(
        gateway: MockGateway,
        planner: P,
    ) -> AgentController<MockGateway, ManualClock, P> {
        AgentController::new(gateway, ManualClock::new(), planner, EngineConfig::default())
    }

    #[test]
    fn planner_starts_chain_then_chain_layer_runs() {
        let gateway = MockGateway::with_inventory(&[("shield", 1)]);
        let mut agent = controller(gateway, QueuePlanner::new(["make_shield"], 2));

        let first = agent.tick();
        assert_eq!(first.layer, ControlLayer::Planner);
        assert!(first.success());
        assert!(agent.executor().has_active());
        assert_eq!(agent.gateway().call_count(), 0);

        let second = agent.tick();
        assert_eq!(second.layer, ControlLayer::Chain);
        assert_eq!(
            agent.gateway().calls(),
            vec![Operation::equip("shield", "off-hand")]
        );

        let third = agent.tick();
        assert_eq!(
            third.chain_result().map(|result| &result.outcome),
            Some(&TickOutcome::Completed)
        );
        assert_eq!(agent.metrics().chains_completed, 1);

        let fourth = agent.tick();
        assert_eq!(fourth.layer, ControlLayer::Observe);
    }

    #[test]
    fn instinct_preempts_active_chain() {
        let gateway = MockGateway::new();
        let mut agent = controller(gateway, QueuePlanner::new(["make_shield"], 2));
        agent.tick();
        agent.gateway().world.borrow_mut().oxygen = 2.0;

        let tick = agent.tick();
        assert_eq!(tick.layer, ControlLayer::Instinct);
        assert_eq!(agent.gateway().tools_called(), vec!["escape_water"]);
        assert!(agent.executor().has_active());
        assert_eq!(agent.metrics().instinct_ticks, 1);
    }

    #[test]
    fn escalation_reaches_planner_on_next_tick() {
        let gateway = MockGateway::new();
        gateway.reply("move_to", false, "Path blocked by a wall");
        let planner = ScriptedPlanner::new(vec![start("walk_home"), PlannerDirective::Wait]);
        let mut agent = controller(gateway, planner);
        agent
            .library
            .save_chain(
                "walk_home",
                "",
                vec![Step::action(Operation::move_to(3.0, 64.0, 3.0))],
            )
            .unwrap();

        agent.tick();
        let failed = agent.tick();
        assert_eq!(failed.layer, ControlLayer::Chain);
        assert!(failed
            .chain_result()
            .is_some_and(TickResult::needs_escalation));
        assert!(!agent.executor().has_active());
        assert_eq!(
            agent.pending_escalation().map(|report| report.reason),
            Some(EscalationReason::MovementBlocked)
        );

        let next = agent.tick();
        assert_eq!(next.layer, ControlLayer::Observe);
        assert!(agent.pending_escalation().is_none());
        assert_eq!(
            agent.planner().escalations,
            vec![None, Some(EscalationReason::MovementBlocked)]
        );
        assert_eq!(agent.metrics().chains_cancelled, 1);
        assert_eq!(agent.metrics().escalations, 1);
    }

    #[test]
    fn planner_failure_keeps_escalation() {
        let gateway = MockGateway::new();
        gateway.reply("move_to", false, "stuck in a hole");
        let planner = ScriptedPlanner::new(vec![start("walk_home")]);
        let mut agent = controller(gateway, planner);
        agent
            .library
            .save_chain(
                "walk_home",
                "",
                vec![Step::action(Operation::move_to(3.0, 64.0, 3.0))],
            )
            .unwrap();

        agent.tick();
        agent.tick();
        let offline = agent.tick();
        assert!(!offline.success());
        assert!(agent.pending_escalation().is_some());
        assert_eq!(agent.metrics().planner_errors, 1);
    }

    #[test]
    fn successful_tool_calls_are_learned() {
        let gateway = MockGateway::new();
        gateway.reply("move_to", false, "Path blocked: wall ahead");
        let fix = vec![Operation::mine("stone", 1), Operation::move_to(3.0, 64.0, 3.0)];
        let planner = ScriptedPlanner::new(vec![
            start("walk_home"),
            PlannerDirective::ToolCalls { calls: fix.clone() },
        ]);
        let mut agent = controller(gateway, planner);
        agent
            .library
            .save_chain(
                "walk_home",
                "",
                vec![Step::action(Operation::move_to(3.0, 64.0, 3.0))],
            )
            .unwrap();

        agent.tick();
        agent.tick();
        let applied = agent.tick();
        assert_eq!(applied.layer, ControlLayer::Planner);
        assert!(applied.success());
        assert_eq!(agent.metrics().learned_solutions, 1);

        let learned = agent
            .experience()
            .error_solution("move_to", "Path blocked: fence")
            .unwrap();
        let operations: Vec<Operation> = learned.into_iter().map(|step| step.operation).collect();
        assert_eq!(operations, fix);
    }

    #[test]
    fn define_chain_saves_and_starts() {
        let planner = ScriptedPlanner::new(vec![PlannerDirective::DefineChain {
            name: "wear_shield".to_string(),
            description: "equip shield".to_string(),
            steps: vec![Step::action(Operation::equip("shield", "off-hand"))],
            start: true,
        }]);
        let mut agent = controller(MockGateway::new(), planner);

        let tick = agent.tick();
        assert!(tick.success());
        assert!(agent.library().custom().get("wear_shield").is_some());
        assert_eq!(
            agent.executor().active().map(|chain| chain.name()),
            Some("wear_shield")
        );
        assert_eq!(agent.metrics().chains_started, 1);
    }

    #[test]
    fn unknown_chain_directive_fails() {
        let planner = ScriptedPlanner::new(vec![start("build_castle")]);
        let mut agent = controller(MockGateway::new(), planner);

        let tick = agent.tick();
        assert_eq!(tick.layer, ControlLayer::Planner);
        assert!(!tick.success());
        assert!(!agent.executor().has_active());
    }

    #[test]
    fn shelter_from_instinct_is_remembered() {
        let gateway = MockGateway::new();
        gateway.world.borrow_mut().health = 4.0;
        let mut agent = controller(gateway, QueuePlanner::new(Vec::<String>::new(), 1));

        let tick = agent.tick();
        assert_eq!(tick.layer, ControlLayer::Instinct);
        let from = agent.gateway().world.borrow().position;
        assert!(agent
            .experience()
            .search_hint(crate::engine::memory::SHELTER_KEY, from, 10.0)
            .is_some());
    }

    #[test]
    fn run_honours_stop_flag_and_tick_limit() {
        let mut agent = controller(MockGateway::new(), QueuePlanner::new(Vec::<String>::new(), 1));
        let stop = AtomicBool::new(true);
        assert_eq!(agent.run(Some(5), Duration::from_millis(100), &stop), 0);

        stop.store(false, Ordering::SeqCst);
        let before = agent.clock().now();
        assert_eq!(agent.run(Some(3), Duration::from_millis(100), &stop), 3);
        assert_eq!(agent.clock().now() - before, Duration::from_millis(300));
        assert_eq!(agent.metrics().idle_ticks, 3);
    }
}
