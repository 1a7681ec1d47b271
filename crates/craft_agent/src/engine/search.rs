//! Resource search: what to do when a search step cannot find its target.
//!
//! Each failed attempt moves the step's [`SearchCursor`] one action forward
//! through four phases: a single scouting trip to a remembered location, the
//! per-target static strategy list, a bounded run of persistent digging or
//! exploration, and finally escalation. The cursor only moves forward and is
//! cleared when the step advances or new steps are spliced in front of it.
//!
//! [`SearchCursor`]: super::chain::SearchCursor

use tracing::{debug, info, warn};

use super::chain::{search_strategies, target_depth, Chain, MineGoal, SearchStrategy, Step, StepKind};
use super::context::EngineContext;
use super::escalation::{EscalationReason, EscalationReport};
use super::executor::{TickOutcome, TickResult};
use super::gateway::ActionOutcome;
use super::memory::CAVE_KEY;
use super::operation::{Direction, Operation};
use super::types::{is_ore, Inventory};
use crate::geometry::BlockPos;

/// Radius used to re-check for the target after a search action.
pub const FIND_RANGE: u32 = 32;
/// Radius of the cavity scan run after excavation.
pub const CAVE_SCAN_RADIUS: u32 = 48;

const BASE_TUNNEL_LENGTH: u32 = 20;
const TUNNEL_GROWTH: u32 = 10;
const BASE_EXPLORE_DISTANCE: u32 = 80;
const EXPLORE_GROWTH: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Scout,
    Static,
    Persistent,
}

impl SearchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchPhase::Scout => "scout",
            SearchPhase::Static => "static",
            SearchPhase::Persistent => "persistent",
        }
    }
}

pub fn is_underground_target(target: &str) -> bool {
    is_ore(target) || matches!(target, "stone" | "cobblestone" | "deepslate" | "obsidian")
}

// ============================================================================
// Gathering counts
// ============================================================================

/// Operation to run for a search step this tick.
///
/// The first attempt of a mining step pins a [`MineGoal`] at the current
/// count plus the requested amount; later attempts only mine what is still
/// missing.
pub(crate) fn effective_operation(chain: &mut Chain, step: &Step, inventory: &Inventory) -> Operation {
    if step.kind != StepKind::Search {
        return step.operation.clone();
    }
    let Some(item) = step.drop_item() else {
        return step.operation.clone();
    };
    match chain.mine_goal() {
        Some(goal) => step.operation.with_count(goal.remaining(inventory)),
        None => {
            let requested = step.operation.requested_count().unwrap_or(1);
            chain.set_mine_goal(MineGoal {
                item: item.to_string(),
                target: inventory.count(item) + requested,
            });
            step.operation.clone()
        }
    }
}

/// Confirms a successful search-step action actually produced the goal count.
///
/// Waits for delayed item pickup, reports a partial result without advancing
/// when items are still missing, and otherwise records the find and advances.
pub(crate) fn complete_search_step(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    step: &Step,
    operation: &Operation,
    method: &str,
    message: String,
) -> TickResult {
    let target = step.target().unwrap_or_default().to_string();

    if let Some(goal) = chain.mine_goal().cloned() {
        let mut inventory = ctx.inventory_or(&Inventory::new());
        let mut remaining = goal.remaining(&inventory);
        let mut polls = 0;
        while remaining > 0 && polls < ctx.config.pickup_polls {
            ctx.clock.sleep(ctx.config.pickup_wait);
            inventory = ctx.inventory_or(&inventory);
            remaining = goal.remaining(&inventory);
            polls += 1;
        }

        if remaining > 0 {
            let have = inventory.count(&goal.item);
            info!(
                chain = chain.name(),
                item = %goal.item,
                have,
                remaining,
                "partial gather, step not advanced"
            );
            chain
                .search_mut()
                .history
                .push(format!("{method}: partial, {remaining} {} still needed", goal.item));
            return TickResult::new(
                operation.to_string(),
                format!("have {have} {}, need {remaining} more", goal.item),
                true,
                TickOutcome::PartialMine {
                    item: goal.item,
                    remaining,
                },
            );
        }
    }

    if !target.is_empty() {
        let position = ctx.position();
        let now = ctx.unix_time();
        ctx.experience
            .record_search_success(&target, method, position, now);
    }
    debug!(chain = chain.name(), target = %target, method, "search step satisfied");
    chain.advance();
    TickResult::new(operation.to_string(), message, true, TickOutcome::Advanced)
}

// ============================================================================
// Failure handling
// ============================================================================

/// Runs the next search action for the current step after its direct attempt failed.
pub(crate) fn handle_search_failure(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    error: &str,
    inventory: &Inventory,
) -> TickResult {
    let Some(step) = chain.current_step().cloned() else {
        return TickResult::new("search", "no current step", false, TickOutcome::NoChain);
    };
    let target = step.target().unwrap_or_default().to_string();

    if !chain.search().scouted {
        chain.search_mut().scouted = true;
        if let Some(result) = scout_memory(ctx, chain, &step, &target) {
            return result;
        }
    }

    let strategies = search_strategies(&target);
    let index = chain.search().static_index;
    if let Some(strategy) = strategies.get(index) {
        chain.search_mut().static_index += 1;
        info!(
            chain = chain.name(),
            target = %target,
            strategy = index + 1,
            total = strategies.len(),
            "static search strategy"
        );
        return run_static(ctx, chain, &step, &target, strategy);
    }

    let attempt = chain.search().persistent_index;
    if attempt < ctx.config.persistent_attempts {
        chain.search_mut().persistent_index += 1;
        let operation = persistent_operation(ctx, chain, &target, attempt);
        info!(
            chain = chain.name(),
            target = %target,
            attempt = attempt + 1,
            limit = ctx.config.persistent_attempts,
            operation = %operation,
            "persistent search"
        );
        return act_and_recheck(ctx, chain, &step, &target, operation, SearchPhase::Persistent);
    }

    let tried = chain.search().history.len();
    warn!(chain = chain.name(), target = %target, tried, "search exhausted");
    let report = EscalationReport::for_chain(
        ctx,
        chain,
        EscalationReason::SearchExhausted,
        format!("cannot find {target} after {tried} search actions"),
        inventory,
    )
    .with_error(error);
    TickResult::escalate(format!("search:{target} exhausted"), report)
}

/// Phase 0: travel to the nearest remembered spot and check it still has the target.
///
/// Returns `None` to fall through to the next phase in the same tick.
fn scout_memory(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    step: &Step,
    target: &str,
) -> Option<TickResult> {
    let from = ctx.position()?;
    let hint = ctx
        .experience
        .search_hint(target, from, ctx.config.max_scout_distance)?;
    let spot = hint.position;
    info!(chain = chain.name(), target, spot = %spot, "scouting remembered location");

    let travel = move_to(spot);
    let outcome = ctx.gateway.execute(&travel);
    chain
        .search_mut()
        .history
        .push(format!("scout {target} at {spot}: {}", outcome_word(&outcome)));
    if !outcome.success {
        debug!(target, message = %outcome.message, "scouting trip failed");
        return None;
    }

    match ctx.gateway.find_block(target, FIND_RANGE) {
        Ok(Some(_)) => Some(TickResult::new(
            format!("scout {}", step.operation),
            format!("{target} still present at {spot}"),
            true,
            TickOutcome::Searching {
                phase: SearchPhase::Scout,
                found: true,
            },
        )),
        Ok(None) => {
            let removed = ctx.experience.remove_location(target, spot);
            warn!(target, spot = %spot, removed, "remembered location is stale");
            None
        }
        Err(err) => {
            warn!(target, error = %err, "could not verify remembered location");
            None
        }
    }
}

/// Phase 1: one entry of the static strategy list.
fn run_static(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    step: &Step,
    target: &str,
    strategy: &SearchStrategy,
) -> TickResult {
    match strategy {
        SearchStrategy::Act(operation) => {
            act_and_recheck(ctx, chain, step, target, operation.clone(), SearchPhase::Static)
        }
        SearchStrategy::CheckMemory => {
            let nearest = ctx
                .position()
                .and_then(|from| ctx.experience.locations_by_distance(target, from).into_iter().next());
            match nearest {
                Some(entry) => act_and_recheck(
                    ctx,
                    chain,
                    step,
                    target,
                    move_to(entry.position),
                    SearchPhase::Static,
                ),
                None => {
                    chain
                        .search_mut()
                        .history
                        .push(format!("check_memory {target}: nothing remembered"));
                    TickResult::new(
                        format!("check_memory({target})"),
                        format!("no remembered location for {target}"),
                        true,
                        TickOutcome::Searching {
                            phase: SearchPhase::Static,
                            found: false,
                        },
                    )
                }
            }
        }
    }
}

/// Phase 2: each remembered cave once for underground targets, then
/// alternating tunnels and descents of growing length; surface targets
/// explore ever farther.
fn persistent_operation(
    ctx: &EngineContext<'_>,
    chain: &mut Chain,
    target: &str,
    attempt: u32,
) -> Operation {
    if !is_underground_target(target) {
        return Operation::Explore {
            distance: BASE_EXPLORE_DISTANCE + EXPLORE_GROWTH * attempt,
        };
    }

    if let Some(from) = ctx.position() {
        let max = ctx.config.max_scout_distance;
        let unvisited = ctx
            .experience
            .locations_by_distance(CAVE_KEY, from)
            .into_iter()
            .filter(|cave| cave.position.distance_to(from) <= max)
            .find(|cave| !chain.search().cave_visited(cave.position));
        if let Some(cave) = unvisited {
            chain.search_mut().visited_caves.push(cave.position);
            return move_to(cave.position);
        }
    }

    if attempt % 2 == 0 {
        Operation::DigTunnel {
            direction: Direction::nth((attempt / 2) as usize),
            length: BASE_TUNNEL_LENGTH + TUNNEL_GROWTH * attempt,
        }
    } else {
        Operation::DigDown {
            depth: None,
            target_y: Some(target_depth(target)),
        }
    }
}

/// Runs a search action, then looks for the target and mines what is still
/// needed if it shows up.
fn act_and_recheck(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    step: &Step,
    target: &str,
    operation: Operation,
    phase: SearchPhase,
) -> TickResult {
    let outcome = ctx.gateway.execute(&operation);
    chain
        .search_mut()
        .history
        .push(format!("{operation}: {}", outcome_word(&outcome)));
    if operation.is_excavation() {
        remember_caves(ctx);
    }

    let searching = |found| TickOutcome::Searching { phase, found };
    if !outcome.success {
        debug!(operation = %operation, message = %outcome.message, "search action failed");
        return TickResult::new(operation.to_string(), outcome.message, false, searching(false));
    }

    let found = match ctx.gateway.find_block(target, FIND_RANGE) {
        Ok(found) => found,
        Err(err) => {
            debug!(target, error = %err, "target re-check failed");
            None
        }
    };
    let Some(position) = found else {
        return TickResult::new(operation.to_string(), outcome.message, true, searching(false));
    };

    info!(target, position = %position, after = %operation, "target located");
    let inventory = ctx.inventory_or(&Inventory::new());
    let retry = effective_operation(chain, step, &inventory);
    let harvest = ctx.gateway.execute(&retry);
    if harvest.success {
        let method = operation.name();
        return complete_search_step(ctx, chain, step, &retry, method, harvest.message);
    }
    chain
        .search_mut()
        .history
        .push(format!("{retry} after {}: {}", operation.name(), harvest.message));
    TickResult::new(retry.to_string(), harvest.message, false, searching(true))
}

/// Records cavities exposed by excavation for the persistent ore phase.
fn remember_caves(ctx: &mut EngineContext<'_>) {
    let caves = match ctx.gateway.scan_caves(CAVE_SCAN_RADIUS) {
        Ok(caves) => caves,
        Err(err) => {
            debug!(error = %err, "cave scan failed");
            return;
        }
    };
    let now = ctx.unix_time();
    for cave in &caves {
        ctx.experience
            .record_search_success(CAVE_KEY, "scan_caves", Some(cave.position), now);
    }
    if !caves.is_empty() {
        debug!(count = caves.len(), "caves remembered");
    }
}

fn move_to(position: BlockPos) -> Operation {
    Operation::move_to(position.x, position.y, position.z)
}

fn outcome_word(outcome: &ActionOutcome) -> &'static str {
    if outcome.success {
        "ok"
    } else {
        "failed"
    }
}
