//! Chain State Machine: runs the single active chain one step per tick.
//!
//! A tick checks the timeout, skips satisfied steps, yields to the instinct
//! layer on environmental danger, injects missing tool prerequisites, and then
//! executes exactly one step. Failures go to the search subsystem for search
//! steps and to [`failure`] for everything else. Any result carrying an
//! escalation report cancels the chain; nothing is dropped without a report.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::chain::{required_pickaxe, Chain, ChainBuilder, Step, StepKind};
use super::context::EngineContext;
use super::escalation::{EscalationReason, EscalationReport};
use super::operation::Operation;
use super::search::{self, SearchPhase};
use super::snapshot::WorldSnapshot;
use super::types::{ChainName, Inventory, ItemName};

mod failure;


/// Radius for `skip_if_nearby` checks not covered by the snapshot.
const NEARBY_CHECK_RANGE: u32 = 32;

// ============================================================================
// Tick results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NoChain,
    /// World state could not be read; nothing was attempted.
    Unavailable,
    Advanced,
    Completed,
    /// A gather step succeeded but left items still missing.
    PartialMine { item: ItemName, remaining: u32 },
    PrerequisiteInjected { chain: ChainName },
    SolutionApplied { steps: usize },
    AutoFixed { fix: String },
    Searching { phase: SearchPhase, found: bool },
    Retrying { attempt: u32 },
    /// Step deferred to the instinct layer without spending a retry.
    Interrupted,
    Cancelled { reason: EscalationReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    pub action: String,
    pub message: String,
    pub success: bool,
    pub outcome: TickOutcome,
    /// Steps skipped before this tick's action.
    pub skipped: usize,
    pub escalation: Option<EscalationReport>,
}

impl TickResult {
    pub(crate) fn new(
        action: impl Into<String>,
        message: impl Into<String>,
        success: bool,
        outcome: TickOutcome,
    ) -> Self {
        Self {
            action: action.into(),
            message: message.into(),
            success,
            outcome,
            skipped: 0,
            escalation: None,
        }
    }

    pub(crate) fn escalate(action: impl Into<String>, report: EscalationReport) -> Self {
        Self {
            action: action.into(),
            message: report.summary(),
            success: false,
            outcome: TickOutcome::Cancelled {
                reason: report.reason,
            },
            skipped: 0,
            escalation: Some(report),
        }
    }

    pub fn needs_escalation(&self) -> bool {
        self.escalation.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartStatus {
    Started {
        chain: ChainName,
        steps: usize,
        timeout: Duration,
        /// Name of the chain that was cancelled to make room.
        replaced: Option<ChainName>,
    },
    UnknownChain { name: String },
}

impl StartStatus {
    pub fn is_started(&self) -> bool {
        matches!(self, StartStatus::Started { .. })
    }
}

impl fmt::Display for StartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartStatus::Started {
                chain,
                steps,
                timeout,
                ..
            } => write!(
                f,
                "started chain {chain} ({steps} steps, {}s limit)",
                timeout.as_secs()
            ),
            StartStatus::UnknownChain { name } => write!(f, "unknown chain: {name}"),
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ChainExecutor {
    active: Option<Chain>,
}

impl ChainExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Chain> {
        self.active.as_ref()
    }

    /// Builds a fresh run of `name`, replacing any active chain.
    pub fn start(
        &mut self,
        ctx: &EngineContext<'_>,
        name: &str,
        overrides: &BTreeMap<ItemName, u32>,
    ) -> StartStatus {
        let Some((template, custom)) = ctx.library.template(name) else {
            warn!(chain = name, "unknown chain requested");
            return StartStatus::UnknownChain {
                name: name.to_string(),
            };
        };

        let chain = ChainBuilder::from_template(&template)
            .with_overrides(overrides)
            .custom(custom)
            .build(ctx.now(), ctx.config);
        let replaced = self.active.take().map(|previous| {
            info!(chain = previous.name(), "chain replaced before finishing");
            previous.name().to_string()
        });
        let status = StartStatus::Started {
            chain: chain.name().to_string(),
            steps: chain.steps().len(),
            timeout: chain.timeout(),
            replaced,
        };
        info!(
            chain = chain.name(),
            steps = chain.steps().len(),
            timeout_secs = chain.timeout().as_secs(),
            custom,
            "chain started"
        );
        self.active = Some(chain);
        status
    }

    /// Drops the active chain without a report. Returns its name.
    pub fn cancel(&mut self, reason: &str) -> Option<ChainName> {
        let chain = self.active.take()?;
        info!(chain = chain.name(), reason, "chain cancelled");
        Some(chain.name().to_string())
    }

    pub fn tick(&mut self, ctx: &mut EngineContext<'_>) -> TickResult {
        let Some(mut chain) = self.active.take() else {
            return TickResult::new("no_chain", "no active chain", false, TickOutcome::NoChain);
        };

        let result = step_chain(ctx, &mut chain);
        if let Some(report) = &result.escalation {
            warn!(
                chain = chain.name(),
                reason = %report.reason,
                message = %report.message,
                "chain cancelled, escalating"
            );
            if chain.is_custom() {
                ctx.library.record_outcome(chain.name(), false);
            }
        } else if result.outcome == TickOutcome::Completed {
            info!(chain = chain.name(), "chain completed");
            if chain.is_custom() {
                ctx.library.record_outcome(chain.name(), true);
            }
        } else {
            self.active = Some(chain);
        }
        result
    }
}

// ============================================================================
// One tick
// ============================================================================

fn step_chain(ctx: &mut EngineContext<'_>, chain: &mut Chain) -> TickResult {
    let now = ctx.now();
    if chain.is_timed_out(now) {
        let elapsed = chain.elapsed(now).as_secs();
        let limit = chain.timeout().as_secs();
        let inventory = ctx.inventory_or(&Inventory::new());
        let report = EscalationReport::for_chain(
            ctx,
            chain,
            EscalationReason::ChainTimeout,
            format!(
                "chain {} timed out after {elapsed}s (limit {limit}s)",
                chain.name()
            ),
            &inventory,
        );
        return TickResult::escalate("timeout", report);
    }

    let world = match ctx.gateway.world_snapshot() {
        Ok(world) => world,
        Err(err) => {
            warn!(chain = chain.name(), error = %err, "world state unavailable");
            return TickResult::new(
                "observe",
                format!("world state unavailable: {err}"),
                false,
                TickOutcome::Unavailable,
            );
        }
    };

    let mut skipped = 0;
    let limit = chain.steps().len();
    while skipped < limit {
        let Some(step) = chain.current_step() else {
            break;
        };
        if !should_skip(ctx, step, &world) {
            break;
        }
        debug!(
            chain = chain.name(),
            step = chain.cursor(),
            operation = %step.operation,
            "step already satisfied, skipping"
        );
        chain.advance();
        skipped += 1;
    }

    let mut result = if chain.is_finished() {
        finish(ctx, chain, &world.inventory)
    } else {
        run_current(ctx, chain, &world)
    };
    result.skipped = skipped;
    result
}

fn should_skip(ctx: &EngineContext<'_>, step: &Step, world: &WorldSnapshot) -> bool {
    if step.inventory_satisfies(&world.inventory) {
        return true;
    }
    let Some(block) = step.skip_if_nearby.as_deref() else {
        return false;
    };
    if world.block_nearby(block) {
        return true;
    }
    matches!(ctx.gateway.find_block(block, NEARBY_CHECK_RANGE), Ok(Some(_)))
}

fn finish(ctx: &mut EngineContext<'_>, chain: &Chain, inventory: &Inventory) -> TickResult {
    let mut gear = Vec::new();
    if let Some(weapon) = inventory.best_weapon() {
        gear.push(Operation::equip(weapon, "hand"));
    }
    for (slot, piece) in inventory.best_armor() {
        gear.push(Operation::equip(piece, slot));
    }
    for operation in &gear {
        let outcome = ctx.gateway.execute(operation);
        if !outcome.success {
            debug!(operation = %operation, message = %outcome.message, "equip after chain failed");
        }
    }
    TickResult::new(
        "chain_complete",
        format!("chain {} completed", chain.name()),
        true,
        TickOutcome::Completed,
    )
}

fn run_current(ctx: &mut EngineContext<'_>, chain: &mut Chain, world: &WorldSnapshot) -> TickResult {
    let config = ctx.config;
    let Some(step) = chain.current_step().cloned() else {
        return finish(ctx, chain, &world.inventory);
    };
    let inventory = &world.inventory;

    let recently_hit = world.combat.under_attack
        && world
            .combat
            .hit_within(config.recent_hit_window.as_secs_f32());
    if world.is_drowning(config.oxygen_threshold) || recently_hit {
        debug!(chain = chain.name(), step = chain.cursor(), "step interrupted by danger");
        return TickResult::new(
            "interrupt",
            "danger nearby, deferring step",
            false,
            TickOutcome::Interrupted,
        );
    }

    if let Some(block) = step.operation.mined_block() {
        if let Some(requirement) = required_pickaxe(block) {
            if !inventory.has_pickaxe_at_least(requirement.pickaxe) {
                let reason = format!("need {} to mine {block}", requirement.pickaxe);
                return inject_prerequisite(ctx, chain, requirement.chain, inventory, reason);
            }
        }
        if let Some(pickaxe) = inventory.best_pickaxe() {
            let outcome = ctx.gateway.execute(&Operation::equip(pickaxe, "hand"));
            if !outcome.success {
                debug!(pickaxe, message = %outcome.message, "could not equip pickaxe");
            }
        }
    }

    let operation = search::effective_operation(chain, &step, inventory);
    info!(
        chain = chain.name(),
        step = chain.cursor(),
        kind = step.kind.as_str(),
        operation = %operation,
        "executing step"
    );
    let outcome = ctx.gateway.execute(&operation);

    if outcome.success {
        ctx.remember_site(&operation);
        if step.kind == StepKind::Search {
            return search::complete_search_step(
                ctx,
                chain,
                &step,
                &operation,
                "direct_nearby",
                outcome.message,
            );
        }
        chain.advance();
        return TickResult::new(operation.to_string(), outcome.message, true, TickOutcome::Advanced);
    }

    debug!(
        chain = chain.name(),
        operation = %operation,
        message = %outcome.message,
        "step failed"
    );
    if step.kind == StepKind::Search {
        search::handle_search_failure(ctx, chain, &outcome.message, inventory)
    } else {
        failure::handle_step_failure(ctx, chain, &operation, &outcome.message, inventory)
    }
}

/// Splices library chain `name` before the current step, or escalates when
/// the chain is unknown or the per-run injection limit is spent.
pub(crate) fn inject_prerequisite(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    name: &str,
    inventory: &Inventory,
    reason: String,
) -> TickResult {
    if !chain.can_inject(ctx.config) {
        let report = EscalationReport::for_chain(
            ctx,
            chain,
            EscalationReason::PrerequisiteUnavailable,
            format!(
                "{reason}, but {} prerequisites were already injected",
                chain.injections()
            ),
            inventory,
        );
        return TickResult::escalate(format!("inject_prereq:{name}"), report);
    }
    let Some(steps) = ctx.chain_steps(name) else {
        let report = EscalationReport::for_chain(
            ctx,
            chain,
            EscalationReason::PrerequisiteUnavailable,
            format!("{reason}, but no chain named {name} exists"),
            inventory,
        );
        return TickResult::escalate(format!("inject_prereq:{name}"), report);
    };

    let count = steps.len();
    chain.inject_prerequisite(steps, ctx.config);
    info!(
        chain = chain.name(),
        prerequisite = name,
        steps = count,
        reason = %reason,
        "prerequisite injected"
    );
    TickResult::new(
        format!("inject_prereq:{name}"),
        format!("{reason}; injected {name} ({count} steps)"),
        true,
        TickOutcome::PrerequisiteInjected {
            chain: name.to_string(),
        },
    )
}
