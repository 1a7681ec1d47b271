//! Core type definitions: inventory, item knowledge tables, and shared constants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Type Aliases
// ============================================================================

pub type ItemName = String;
pub type ChainName = String;

// ============================================================================
// Constants
// ============================================================================

pub const MAX_HEALTH: f32 = 20.0;
pub const MAX_FOOD: f32 = 20.0;
pub const MAX_OXYGEN: f32 = 20.0;
pub const INVENTORY_SLOTS: u32 = 36;

// ============================================================================
// Inventory
// ============================================================================

/// Item counts aggregated across inventory slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub counts: BTreeMap<ItemName, u32>,
}

/// One inventory slot as reported by the bot service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySlot {
    pub name: ItemName,
    pub count: u32,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots<'a>(slots: impl IntoIterator<Item = &'a InventorySlot>) -> Self {
        let mut inventory = Self::new();
        for slot in slots {
            inventory.add(slot.name.as_str(), slot.count);
        }
        inventory
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let mut inventory = Self::new();
        for (name, count) in pairs {
            inventory.add(name, count);
        }
        inventory
    }

    pub fn count(&self, item: &str) -> u32 {
        self.counts.get(item).copied().unwrap_or(0)
    }

    pub fn has(&self, item: &str) -> bool {
        self.count(item) > 0
    }

    pub fn add(&mut self, item: &str, count: u32) {
        if count == 0 {
            return;
        }
        *self.counts.entry(item.to_string()).or_insert(0) += count;
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn has_food(&self) -> bool {
        FOOD_ITEMS.iter().any(|food| self.has(food))
    }

    pub fn has_weapon(&self) -> bool {
        self.best_weapon().is_some()
    }

    pub fn has_shield(&self) -> bool {
        self.has("shield")
    }

    pub fn best_pickaxe(&self) -> Option<&'static str> {
        PICKAXE_TIERS
            .iter()
            .rev()
            .find(|tool| self.has(tool))
            .copied()
    }

    pub fn has_pickaxe_at_least(&self, required: &str) -> bool {
        let Some(required_idx) = pickaxe_tier(required) else {
            return false;
        };
        PICKAXE_TIERS[required_idx..]
            .iter()
            .any(|tool| self.has(tool))
    }

    pub fn best_weapon(&self) -> Option<&'static str> {
        WEAPON_PREFERENCE
            .iter()
            .find(|weapon| self.has(weapon))
            .copied()
    }

    /// Best armor piece held for each slot, in head/torso/legs/feet order.
    pub fn best_armor(&self) -> Vec<(&'static str, &'static str)> {
        ARMOR_SLOTS
            .iter()
            .filter_map(|(slot, pieces)| {
                pieces
                    .iter()
                    .find(|piece| self.has(piece))
                    .map(|piece| (*slot, *piece))
            })
            .collect()
    }

    pub fn log_count(&self) -> u32 {
        LOG_TYPES.iter().map(|log| self.count(log)).sum()
    }

    /// Bounded `item xN` listing used in escalation context.
    pub fn summary(&self, limit: usize) -> String {
        if self.counts.is_empty() {
            return "empty".to_string();
        }
        let mut parts: Vec<String> = self
            .counts
            .iter()
            .take(limit)
            .map(|(name, count)| format!("{name} x{count}"))
            .collect();
        if self.counts.len() > limit {
            parts.push(format!("(+{} more)", self.counts.len() - limit));
        }
        parts.join(", ")
    }

    /// Bounded copy of the first `limit` entries.
    pub fn truncated(&self, limit: usize) -> BTreeMap<ItemName, u32> {
        self.counts
            .iter()
            .take(limit)
            .map(|(name, count)| (name.clone(), *count))
            .collect()
    }
}

// ============================================================================
// Item knowledge
// ============================================================================

pub const FOOD_ITEMS: &[&str] = &[
    "cooked_beef",
    "cooked_porkchop",
    "cooked_chicken",
    "cooked_mutton",
    "bread",
    "apple",
    "golden_apple",
    "baked_potato",
    "sweet_berries",
    "cooked_salmon",
    "cooked_cod",
    "carrot",
];

/// Pickaxe tiers, weakest first.
pub const PICKAXE_TIERS: &[&str] = &[
    "wooden_pickaxe",
    "stone_pickaxe",
    "iron_pickaxe",
    "diamond_pickaxe",
];

/// Weapons, strongest first.
pub const WEAPON_PREFERENCE: &[&str] = &[
    "diamond_sword",
    "iron_sword",
    "diamond_axe",
    "stone_sword",
    "iron_axe",
    "wooden_sword",
    "stone_axe",
    "wooden_axe",
];

pub const ARMOR_SLOTS: &[(&str, &[&str])] = &[
    ("head", &["diamond_helmet", "iron_helmet", "leather_helmet"]),
    (
        "torso",
        &["diamond_chestplate", "iron_chestplate", "leather_chestplate"],
    ),
    (
        "legs",
        &["diamond_leggings", "iron_leggings", "leather_leggings"],
    ),
    ("feet", &["diamond_boots", "iron_boots", "leather_boots"]),
];

pub const LOG_TYPES: &[&str] = &[
    "oak_log",
    "spruce_log",
    "birch_log",
    "jungle_log",
    "acacia_log",
    "dark_oak_log",
];

/// Blocks worth remembering when placed.
pub const STATION_BLOCKS: &[&str] = &[
    "crafting_table",
    "furnace",
    "blast_furnace",
    "smoker",
    "chest",
    "barrel",
    "anvil",
    "enchanting_table",
    "smithing_table",
];

pub const STORAGE_BLOCKS: &[&str] = &["chest", "trapped_chest", "barrel"];

pub fn pickaxe_tier(tool: &str) -> Option<usize> {
    PICKAXE_TIERS.iter().position(|tier| *tier == tool)
}

/// Item received when a block is mined.
pub fn drop_for_block(block: &str) -> &str {
    match block {
        "stone" => "cobblestone",
        "iron_ore" | "deepslate_iron_ore" => "raw_iron",
        "coal_ore" | "deepslate_coal_ore" => "coal",
        "copper_ore" | "deepslate_copper_ore" => "raw_copper",
        "gold_ore" | "deepslate_gold_ore" => "raw_gold",
        "diamond_ore" | "deepslate_diamond_ore" => "diamond",
        "lapis_ore" | "deepslate_lapis_ore" => "lapis_lazuli",
        "redstone_ore" | "deepslate_redstone_ore" => "redstone",
        "emerald_ore" => "emerald",
        "nether_gold_ore" => "gold_nugget",
        "nether_quartz_ore" => "quartz",
        "grass_block" => "dirt",
        other => other,
    }
}

pub fn is_weapon(item: &str) -> bool {
    item.ends_with("_sword") || item.ends_with("_axe")
}

pub fn is_ore(block: &str) -> bool {
    block.ends_with("_ore")
}

pub fn is_food(item: &str) -> bool {
    FOOD_ITEMS.contains(&item)
}

/// Mob types that kill at point-blank range faster than any shelter can be dug.
pub fn is_point_blank_lethal(kind: &str) -> bool {
    matches!(kind, "creeper" | "warden")
}
