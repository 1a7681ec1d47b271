//! Read-only per-tick views of the world, threats, and combat.

use serde::{Deserialize, Serialize};

use super::types::{Inventory, INVENTORY_SLOTS, MAX_HEALTH, MAX_OXYGEN};
use crate::geometry::{BlockPos, SURFACE_Y};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Surface,
    Indoors,
    Underground,
    DeepUnderground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePhase {
    #[default]
    Day,
    Dusk,
    Night,
    Dawn,
}

/// Combat status as tracked by the bot service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CombatStatus {
    pub under_attack: bool,
    pub last_attacker: Option<String>,
    /// Seconds since the bot last took a hit, if it ever did.
    pub seconds_since_hit: Option<f32>,
}

impl CombatStatus {
    pub fn hit_within(&self, window_secs: f32) -> bool {
        self.seconds_since_hit
            .map(|secs| secs <= window_secs)
            .unwrap_or(false)
    }
}

/// An entity observed near the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyEntity {
    pub kind: String,
    pub distance: f32,
}

/// Fresh per-tick world view. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub health: f32,
    pub food: f32,
    pub oxygen: f32,
    pub is_safe_outside: bool,
    pub can_see_sky: bool,
    pub environment: Environment,
    pub time_phase: TimePhase,
    pub position: BlockPos,
    pub inventory: Inventory,
    pub empty_slots: u32,
    pub nearby_entities: Vec<NearbyEntity>,
    pub nearby_blocks: Vec<String>,
    pub nearby_drops: u32,
    pub combat: CombatStatus,
}

impl Default for WorldSnapshot {
    fn default() -> Self {
        Self {
            health: MAX_HEALTH,
            food: 20.0,
            oxygen: MAX_OXYGEN,
            is_safe_outside: true,
            can_see_sky: true,
            environment: Environment::Surface,
            time_phase: TimePhase::Day,
            position: BlockPos::new(0.0, 64.0, 0.0),
            inventory: Inventory::new(),
            empty_slots: INVENTORY_SLOTS,
            nearby_entities: Vec::new(),
            nearby_blocks: Vec::new(),
            nearby_drops: 0,
            combat: CombatStatus::default(),
        }
    }
}

impl WorldSnapshot {
    pub fn is_sheltered(&self) -> bool {
        matches!(
            self.environment,
            Environment::Indoors | Environment::Underground | Environment::DeepUnderground
        ) || !self.can_see_sky
            || self.position.y < SURFACE_Y
    }

    pub fn is_drowning(&self, oxygen_threshold: f32) -> bool {
        self.oxygen <= oxygen_threshold
    }

    pub fn is_dark_phase(&self) -> bool {
        matches!(self.time_phase, TimePhase::Dusk | TimePhase::Night) || !self.is_safe_outside
    }

    pub fn block_nearby(&self, block: &str) -> bool {
        self.nearby_blocks.iter().any(|name| name == block)
    }
}

// ============================================================================
// Threat assessment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    #[default]
    Safe,
    Fight,
    FightCareful,
    Avoid,
    Flee,
}

impl Recommendation {
    pub fn favors_fighting(&self) -> bool {
        matches!(self, Recommendation::Fight | Recommendation::FightCareful)
    }

    pub fn favors_flight(&self) -> bool {
        matches!(self, Recommendation::Avoid | Recommendation::Flee)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub distance: f32,
    #[serde(default)]
    pub danger: f32,
}

/// Threat assessment for the current tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreatSnapshot {
    pub recommendation: Recommendation,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub threats: Vec<ThreatDetail>,
    #[serde(default)]
    pub is_night: bool,
}

impl ThreatSnapshot {
    /// Fallback used when the service cannot be queried.
    pub fn safe() -> Self {
        Self::default()
    }

    pub fn has_threats(&self) -> bool {
        !self.threats.is_empty()
    }

    pub fn nearest(&self) -> Option<&ThreatDetail> {
        self.threats
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    pub fn nearest_within(&self, range: f32) -> Option<&ThreatDetail> {
        self.nearest().filter(|threat| threat.distance <= range)
    }
}
