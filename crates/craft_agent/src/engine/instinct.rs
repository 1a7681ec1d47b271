//! Reactive survival rules evaluated before any chain work.
//!
//! Rules are checked in fixed priority order and the first match wins. The
//! layer keeps only cooldown deadlines and the previous tick's health; it never
//! touches chain state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use super::config::EngineConfig;
use super::gateway::ActionGateway;
use super::operation::Operation;
use super::snapshot::{Recommendation, ThreatSnapshot, TimePhase, WorldSnapshot};
use super::types::{is_point_blank_lethal, Inventory, STORAGE_BLOCKS};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstinctRule {
    Drowning,
    CriticalHealth,
    SuddenDamage,
    UnderAttack,
    PointBlankThreat,
    FleeRecommended,
    ProactiveFight,
    NightExposure,
    Hunger,
    HostileInShelter,
    InventoryFull,
    CollectDrops,
}

impl InstinctRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstinctRule::Drowning => "drowning",
            InstinctRule::CriticalHealth => "critical_health",
            InstinctRule::SuddenDamage => "sudden_damage",
            InstinctRule::UnderAttack => "under_attack",
            InstinctRule::PointBlankThreat => "point_blank_threat",
            InstinctRule::FleeRecommended => "flee_recommended",
            InstinctRule::ProactiveFight => "proactive_fight",
            InstinctRule::NightExposure => "night_exposure",
            InstinctRule::Hunger => "hunger",
            InstinctRule::HostileInShelter => "hostile_in_shelter",
            InstinctRule::InventoryFull => "inventory_full",
            InstinctRule::CollectDrops => "collect_drops",
        }
    }
}

impl fmt::Display for InstinctRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single urgent action chosen for this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct InstinctAction {
    pub rule: InstinctRule,
    /// Gear and guard operations issued before the primary action.
    pub prelude: Vec<Operation>,
    pub primary: Operation,
    /// Tried when the primary action fails.
    pub fallback: Option<Operation>,
    pub reason: String,
}

impl InstinctAction {
    fn new(rule: InstinctRule, primary: Operation, reason: impl Into<String>) -> Self {
        Self {
            rule,
            prelude: Vec::new(),
            primary,
            fallback: None,
            reason: reason.into(),
        }
    }

    fn with_prelude(mut self, prelude: Vec<Operation>) -> Self {
        self.prelude = prelude;
        self
    }

    fn with_fallback(mut self, fallback: Operation) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn label(&self) -> String {
        format!("{} [{}]", self.primary, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstinctOutcome {
    pub rule: InstinctRule,
    /// Last operation sent: the fallback when it ran, else the primary.
    pub operation: Operation,
    pub action: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct InstinctLayer {
    config: EngineConfig,
    shelter_ready_at: Option<Instant>,
    deposit_ready_at: Option<Instant>,
    collect_ready_at: Option<Instant>,
    last_health: Option<f32>,
}

impl InstinctLayer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            shelter_ready_at: None,
            deposit_ready_at: None,
            collect_ready_at: None,
            last_health: None,
        }
    }

    fn ready(deadline: Option<Instant>, now: Instant) -> bool {
        deadline.map(|at| now >= at).unwrap_or(true)
    }

    pub fn shelter_ready(&self, now: Instant) -> bool {
        Self::ready(self.shelter_ready_at, now)
    }

    fn arm_shelter(&mut self, now: Instant) {
        self.shelter_ready_at = Some(now + self.config.shelter_cooldown);
    }

    /// Picks at most one action. Updates the rolling health sample and arms
    /// cooldowns for the rule that fires.
    pub fn evaluate(
        &mut self,
        world: &WorldSnapshot,
        threat: &ThreatSnapshot,
        now: Instant,
    ) -> Option<InstinctAction> {
        let health_drop = self
            .last_health
            .map(|previous| previous - world.health)
            .unwrap_or(0.0);
        self.last_health = Some(world.health);

        let action = self.select(world, threat, health_drop, now)?;
        match action.rule {
            InstinctRule::InventoryFull => {
                self.deposit_ready_at = Some(now + self.config.deposit_cooldown);
            }
            InstinctRule::CollectDrops => {
                self.collect_ready_at = Some(now + self.config.collect_cooldown);
            }
            _ => {}
        }
        if matches!(action.primary, Operation::DigShelter {}) {
            self.arm_shelter(now);
        }
        Some(action)
    }

    fn select(
        &self,
        world: &WorldSnapshot,
        threat: &ThreatSnapshot,
        health_drop: f32,
        now: Instant,
    ) -> Option<InstinctAction> {
        let config = &self.config;
        let inventory = &world.inventory;
        let armed = inventory.has_weapon();
        let sheltered = world.is_sheltered();
        let recent_hit = world.combat.under_attack
            && world
                .combat
                .hit_within(config.recent_hit_window.as_secs_f32());

        // 1. drowning
        if world.is_drowning(config.oxygen_threshold) {
            return Some(InstinctAction::new(
                InstinctRule::Drowning,
                Operation::EscapeWater {},
                format!("oxygen {:.0}", world.oxygen),
            ));
        }

        // 2. critical health
        if world.health < config.critical_health {
            if inventory.has_food() {
                return Some(InstinctAction::new(
                    InstinctRule::CriticalHealth,
                    Operation::EatFood {},
                    format!("critical health {:.0}", world.health),
                ));
            }
            if world.combat.under_attack {
                return Some(
                    InstinctAction::new(
                        InstinctRule::CriticalHealth,
                        Operation::Flee {},
                        "critical health, under attack, no food",
                    )
                    .with_fallback(Operation::DigShelter {}),
                );
            }
            if self.shelter_ready(now) {
                return Some(InstinctAction::new(
                    InstinctRule::CriticalHealth,
                    Operation::DigShelter {},
                    "critical health, no food",
                ));
            }
        }

        // 3. sudden damage
        if health_drop >= config.sudden_damage && threat.has_threats() {
            let mut prelude = Vec::new();
            if inventory.has_shield() {
                prelude.push(Operation::ShieldBlock {});
            }
            let reason = format!("lost {health_drop:.0} health");
            if armed && threat.recommendation.favors_fighting() {
                if let Some(target) = threat.nearest().map(|t| t.kind.clone()) {
                    prelude.extend(combat_gear(inventory));
                    return Some(
                        InstinctAction::new(InstinctRule::SuddenDamage, Operation::attack(target), reason)
                            .with_prelude(prelude),
                    );
                }
            }
            return Some(
                InstinctAction::new(InstinctRule::SuddenDamage, Operation::Flee {}, reason)
                    .with_prelude(prelude),
            );
        }

        // 4. recent hit
        if recent_hit {
            let attacker = world
                .combat
                .last_attacker
                .clone()
                .or_else(|| threat.nearest().map(|t| t.kind.clone()))
                .unwrap_or_default();
            let fight = armed
                && (threat.recommendation.favors_fighting()
                    || threat.recommendation == Recommendation::Safe);
            if fight && !attacker.is_empty() {
                return Some(
                    InstinctAction::new(
                        InstinctRule::UnderAttack,
                        Operation::attack(attacker.clone()),
                        format!("fighting back against {attacker}"),
                    )
                    .with_prelude(combat_gear(inventory)),
                );
            }
            let prelude = if inventory.has_shield() {
                vec![Operation::ShieldBlock {}]
            } else {
                Vec::new()
            };
            return Some(
                InstinctAction::new(
                    InstinctRule::UnderAttack,
                    Operation::Flee {},
                    format!("under attack by {}", display_or(&attacker, "unknown")),
                )
                .with_prelude(prelude),
            );
        }

        // 5. point-blank lethal mob
        if let Some(lethal) = threat
            .threats
            .iter()
            .find(|t| is_point_blank_lethal(&t.kind) && t.distance <= config.lethal_radius)
        {
            return Some(InstinctAction::new(
                InstinctRule::PointBlankThreat,
                Operation::Flee {},
                format!("{} at {:.1} blocks", lethal.kind, lethal.distance),
            ));
        }

        // 6. flee or avoid
        if threat.recommendation.favors_flight() && threat.has_threats() && !sheltered {
            let action = InstinctAction::new(
                InstinctRule::FleeRecommended,
                Operation::Flee {},
                display_or(&threat.reason, "threat assessment says flee").to_string(),
            );
            return Some(if self.shelter_ready(now) {
                action.with_fallback(Operation::DigShelter {})
            } else {
                action
            });
        }

        // 7. proactive melee
        if threat.recommendation.favors_fighting() && armed {
            if let Some(target) = threat.nearest_within(config.melee_range) {
                return Some(
                    InstinctAction::new(
                        InstinctRule::ProactiveFight,
                        Operation::attack(target.kind.clone()),
                        format!("{} in melee range", target.kind),
                    )
                    .with_prelude(combat_gear(inventory)),
                );
            }
        }

        // 8. dark and exposed
        if world.is_dark_phase() && !sheltered && self.shelter_ready(now) {
            let reason = match world.time_phase {
                TimePhase::Dusk => "dusk on the surface",
                TimePhase::Night => "night on the surface",
                _ => "unsafe outside",
            };
            return Some(InstinctAction::new(
                InstinctRule::NightExposure,
                Operation::DigShelter {},
                reason,
            ));
        }

        // 9. hunger
        if world.food < config.hunger_threshold && inventory.has_food() {
            return Some(InstinctAction::new(
                InstinctRule::Hunger,
                Operation::EatFood {},
                format!("hungry {:.0}", world.food),
            ));
        }

        // 10. mob inside shelter
        if sheltered && armed {
            if let Some(target) = threat.nearest_within(config.lethal_radius) {
                return Some(
                    InstinctAction::new(
                        InstinctRule::HostileInShelter,
                        Operation::attack(target.kind.clone()),
                        format!("{} inside shelter", target.kind),
                    )
                    .with_prelude(combat_gear(inventory)),
                );
            }
        }

        // 11. inventory full
        if world.empty_slots <= config.full_inventory_free_slots
            && STORAGE_BLOCKS.iter().any(|block| world.block_nearby(block))
            && Self::ready(self.deposit_ready_at, now)
        {
            return Some(InstinctAction::new(
                InstinctRule::InventoryFull,
                Operation::StoreItems {},
                format!("{} free slots", world.empty_slots),
            ));
        }

        // 12. loose drops
        if world.nearby_drops > 0
            && !threat.has_threats()
            && !world.combat.under_attack
            && Self::ready(self.collect_ready_at, now)
        {
            return Some(InstinctAction::new(
                InstinctRule::CollectDrops,
                Operation::CollectDrops {},
                format!("{} drops nearby", world.nearby_drops),
            ));
        }

        None
    }

    /// Runs the chosen action: prelude, primary, then fallback if the primary failed.
    pub fn fire(
        &mut self,
        action: &InstinctAction,
        gateway: &dyn ActionGateway,
        now: Instant,
    ) -> InstinctOutcome {
        for operation in &action.prelude {
            let outcome = gateway.execute(operation);
            if !outcome.success {
                debug!(operation = %operation, message = %outcome.message, "instinct prelude failed");
            }
        }

        let mut label = action.label();
        let mut executed = &action.primary;
        let mut outcome = gateway.execute(executed);
        if !outcome.success {
            if let Some(fallback) = &action.fallback {
                debug!(rule = %action.rule, primary = %action.primary, "primary failed, trying fallback");
                if matches!(fallback, Operation::DigShelter {}) {
                    self.arm_shelter(now);
                }
                outcome = gateway.execute(fallback);
                executed = fallback;
                label = format!("{label} -> {fallback}");
            }
        }

        info!(
            rule = %action.rule,
            action = %label,
            success = outcome.success,
            "instinct fired"
        );
        InstinctOutcome {
            rule: action.rule,
            operation: executed.clone(),
            action: label,
            success: outcome.success,
            message: outcome.message,
        }
    }
}

/// Equip operations for the strongest weapon and armor pieces held.
fn combat_gear(inventory: &Inventory) -> Vec<Operation> {
    let mut gear = Vec::new();
    if let Some(weapon) = inventory.best_weapon() {
        gear.push(Operation::equip(weapon, "hand"));
    }
    for (slot, piece) in inventory.best_armor() {
        gear.push(Operation::equip(piece, slot));
    }
    gear
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
