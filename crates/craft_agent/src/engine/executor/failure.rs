//! Recovery for failed non-search steps.
//!
//! Checks run in a fixed order: learned solutions, missing materials, the
//! retry ceiling, deterministic auto-fixes, blocked movement, plain retry.

use tracing::{debug, info, warn};

use super::{inject_prerequisite, TickOutcome, TickResult};
use crate::engine::chain::{material_source, required_pickaxe, Chain};
use crate::engine::context::EngineContext;
use crate::engine::escalation::{EscalationReason, EscalationReport};
use crate::engine::memory::error_keyword;
use crate::engine::operation::Operation;
use crate::engine::types::{Inventory, PICKAXE_TIERS};

const STATION_FIND_RANGE: u32 = 32;
const PLANKS_PER_TABLE: u32 = 4;
const COBBLESTONE_PER_FURNACE: u32 = 8;

const MISSING_MATERIAL_MARKERS: &[&str] = &[
    "missing material",
    "missing ingredient",
    "not enough",
    "insufficient",
    "don't have enough",
    "lacking",
];

const MOVEMENT_BLOCKED_MARKERS: &[&str] = &["blocked", "stuck", "timed out"];

pub(super) fn handle_step_failure(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    operation: &Operation,
    error: &str,
    inventory: &Inventory,
) -> TickResult {
    let lowered = error.to_lowercase();
    let config = ctx.config;

    // learned fix, replayed once per run
    if let Some(steps) = ctx.experience.error_solution(operation.name(), error) {
        let key = format!("{}:{}", operation.name(), error_keyword(error));
        if chain.solution_replayed(&key) {
            let report = EscalationReport::for_chain(
                ctx,
                chain,
                EscalationReason::RetryCeiling,
                format!("learned solution for {} did not clear the error", operation.name()),
                inventory,
            )
            .with_operation(operation.clone())
            .with_error(error);
            return TickResult::escalate(format!("escalate:{}", operation.name()), report);
        }
        if chain.can_inject(config) {
            let count = steps.len();
            chain.replay_solution(key, steps, config);
            info!(
                chain = chain.name(),
                operation = operation.name(),
                steps = count,
                "replaying learned solution"
            );
            return TickResult::new(
                "apply_solution",
                format!("replaying {count} learned steps for {}", operation.name()),
                true,
                TickOutcome::SolutionApplied { steps: count },
            );
        }
        debug!(chain = chain.name(), "injection limit reached, learned solution skipped");
    }

    // missing materials never improve by retrying
    if is_crafting(operation) && is_missing_material(&lowered) {
        return handle_missing_material(ctx, chain, operation, error, &lowered, inventory);
    }

    let attempt = chain.record_failure();
    if attempt > config.retry_ceiling {
        let report = EscalationReport::for_chain(
            ctx,
            chain,
            EscalationReason::RetryCeiling,
            format!("{operation} failed {attempt} times"),
            inventory,
        )
        .with_operation(operation.clone())
        .with_error(error);
        return TickResult::escalate(format!("escalate:{}", operation.name()), report);
    }

    if lowered.contains("crafting table") || lowered.contains("crafting_table") {
        return ensure_crafting_table(ctx, chain, inventory);
    }

    if lowered.contains("furnace") && (lowered.contains("nearby") || lowered.contains("no furnace")) {
        return ensure_furnace(ctx, chain, inventory);
    }

    if matches!(operation, Operation::PlaceBlock { .. }) && lowered.contains("no suitable position") {
        if let Some(result) = clear_space(ctx) {
            return result;
        }
    }

    if lowered.contains("pickaxe")
        && (lowered.contains("need") || lowered.contains("require") || lowered.contains("craft"))
    {
        let prerequisite = pickaxe_chain_for(operation, &lowered);
        let reason = format!("{} reported a missing pickaxe", operation.name());
        return inject_prerequisite(ctx, chain, prerequisite, inventory, reason);
    }

    if operation.is_movement()
        && MOVEMENT_BLOCKED_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
    {
        let report = EscalationReport::for_chain(
            ctx,
            chain,
            EscalationReason::MovementBlocked,
            "movement failed and the path stays blocked",
            inventory,
        )
        .with_operation(operation.clone())
        .with_error(error);
        return TickResult::escalate(format!("escalate:{}", operation.name()), report);
    }

    debug!(
        chain = chain.name(),
        operation = operation.name(),
        attempt,
        "step will be retried"
    );
    TickResult::new(
        format!("retry:{}", operation.name()),
        format!("retry {attempt}/{}: {error}", config.retry_ceiling),
        false,
        TickOutcome::Retrying { attempt },
    )
}

fn is_crafting(operation: &Operation) -> bool {
    matches!(
        operation,
        Operation::CraftItem { .. } | Operation::SmeltItem { .. }
    )
}

fn is_missing_material(lowered: &str) -> bool {
    MISSING_MATERIAL_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// First item-like word in the error text with a known source, else the
/// first snake_case word.
pub(super) fn missing_item(lowered: &str) -> Option<String> {
    let words: Vec<&str> = lowered
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .filter(|word| !word.is_empty() && !word.chars().all(|ch| ch.is_ascii_digit()))
        .collect();
    words
        .iter()
        .find(|word| material_source(word).is_some())
        .or_else(|| words.iter().find(|word| word.contains('_')))
        .map(|word| (*word).to_string())
}

fn handle_missing_material(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    operation: &Operation,
    error: &str,
    lowered: &str,
    inventory: &Inventory,
) -> TickResult {
    let item = missing_item(lowered);
    let source = item.as_deref().and_then(material_source);

    if let (Some(item), Some(source)) = (item.as_deref(), source) {
        if chain.can_inject(ctx.config) && chain.mark_material_fix(item) {
            chain.inject_prerequisite(vec![source.gather_step(item)], ctx.config);
            info!(
                chain = chain.name(),
                item,
                block = source.block,
                "injected gathering step for missing material"
            );
            return TickResult::new(
                format!("inject_gather:{}", source.block),
                format!("{} needs {item}; gathering {} first", operation.name(), source.block),
                true,
                TickOutcome::PrerequisiteInjected {
                    chain: format!("gather_{}", source.block),
                },
            );
        }
    }

    let message = match item.as_deref() {
        Some(item) => format!("{operation} is missing {item} and no local fix is left"),
        None => format!("{operation} is missing materials"),
    };
    warn!(chain = chain.name(), operation = operation.name(), "missing material, escalating");
    let report = EscalationReport::for_chain(
        ctx,
        chain,
        EscalationReason::MissingMaterial,
        message,
        inventory,
    )
    .with_operation(operation.clone())
    .with_error(error);
    TickResult::escalate(format!("escalate:{}", operation.name()), report)
}

fn pickaxe_chain_for(operation: &Operation, lowered: &str) -> &'static str {
    if let Some(requirement) = operation.mined_block().and_then(required_pickaxe) {
        return requirement.chain;
    }
    PICKAXE_TIERS
        .iter()
        .rev()
        .find(|tier| lowered.contains(*tier))
        .map(|tier| match *tier {
            "diamond_pickaxe" => "make_diamond_pickaxe",
            "iron_pickaxe" => "make_iron_pickaxe",
            "stone_pickaxe" => "make_stone_pickaxe",
            _ => "make_wooden_pickaxe",
        })
        .unwrap_or("make_wooden_pickaxe")
}

// ============================================================================
// Auto-fixes
// ============================================================================

fn fixed(fix: &str, message: impl Into<String>) -> TickResult {
    TickResult::new(
        format!("auto_fix:{fix}"),
        message,
        true,
        TickOutcome::AutoFixed {
            fix: fix.to_string(),
        },
    )
}

fn station_nearby(ctx: &EngineContext<'_>, block: &str) -> bool {
    matches!(ctx.gateway.find_block(block, STATION_FIND_RANGE), Ok(Some(_)))
}

fn place_station(ctx: &mut EngineContext<'_>, block: &str) -> bool {
    let operation = Operation::place(block);
    let outcome = ctx.gateway.execute(&operation);
    if outcome.success {
        ctx.remember_site(&operation);
    } else {
        debug!(block, message = %outcome.message, "station placement failed");
    }
    outcome.success
}

fn craft(ctx: &EngineContext<'_>, item: &str) -> bool {
    ctx.gateway.execute(&Operation::craft(item)).success
}

/// Find, then place from inventory, then craft from planks or logs; inject
/// `make_crafting_table` when none of that is possible.
fn ensure_crafting_table(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    inventory: &Inventory,
) -> TickResult {
    const TABLE: &str = "crafting_table";
    if station_nearby(ctx, TABLE) {
        return fixed(TABLE, "crafting_table already nearby");
    }
    if inventory.has(TABLE) {
        if place_station(ctx, TABLE) {
            return fixed(TABLE, "placed crafting_table from inventory");
        }
        if clear_space(ctx).is_some() && place_station(ctx, TABLE) {
            return fixed(TABLE, "placed crafting_table after clearing space");
        }
    }
    if inventory.count("oak_planks") >= PLANKS_PER_TABLE {
        if craft(ctx, TABLE) && place_station(ctx, TABLE) {
            return fixed(TABLE, "crafted and placed crafting_table from planks");
        }
    } else if inventory.log_count() > 0 {
        if craft(ctx, "oak_planks") && craft(ctx, TABLE) && place_station(ctx, TABLE) {
            return fixed(TABLE, "turned logs into a placed crafting_table");
        }
    }
    inject_prerequisite(
        ctx,
        chain,
        "make_crafting_table",
        inventory,
        "no crafting table reachable".to_string(),
    )
}

/// Place from inventory, reuse one nearby, or craft from cobblestone; inject
/// `place_furnace` otherwise.
fn ensure_furnace(
    ctx: &mut EngineContext<'_>,
    chain: &mut Chain,
    inventory: &Inventory,
) -> TickResult {
    const FURNACE: &str = "furnace";
    if inventory.has(FURNACE) && place_station(ctx, FURNACE) {
        return fixed(FURNACE, "placed furnace from inventory");
    }
    if station_nearby(ctx, FURNACE) {
        return fixed(FURNACE, "furnace already nearby");
    }
    if inventory.count("cobblestone") >= COBBLESTONE_PER_FURNACE
        && station_nearby(ctx, "crafting_table")
        && craft(ctx, FURNACE)
        && place_station(ctx, FURNACE)
    {
        return fixed(FURNACE, "crafted and placed furnace");
    }
    inject_prerequisite(
        ctx,
        chain,
        "place_furnace",
        inventory,
        "no furnace reachable".to_string(),
    )
}

/// Mines one stone, or dirt when that fails, to open a placement spot.
fn clear_space(ctx: &EngineContext<'_>) -> Option<TickResult> {
    let cleared = ["stone", "dirt"]
        .iter()
        .find(|block| ctx.gateway.execute(&Operation::mine(**block, 1)).success)?;
    Some(fixed("clear_space", format!("mined {cleared} to make room for placement")))
}
