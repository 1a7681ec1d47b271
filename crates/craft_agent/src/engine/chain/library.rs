//! Built-in chain templates and the game knowledge they rely on.

use super::{ChainTemplate, Step};
use crate::engine::operation::{Direction, Operation};
use crate::engine::types::drop_for_block;

// ============================================================================
// Tool requirements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickaxeRequirement {
    pub pickaxe: &'static str,
    pub chain: &'static str,
}

/// Minimum pickaxe (and the chain that makes it) needed to mine `block`.
pub fn required_pickaxe(block: &str) -> Option<PickaxeRequirement> {
    let (pickaxe, chain) = match block {
        "stone" | "cobblestone" | "coal_ore" | "deepslate_coal_ore" => {
            ("wooden_pickaxe", "make_wooden_pickaxe")
        }
        "iron_ore" | "deepslate_iron_ore" | "copper_ore" | "deepslate_copper_ore"
        | "lapis_ore" | "deepslate_lapis_ore" => ("stone_pickaxe", "make_stone_pickaxe"),
        "diamond_ore" | "deepslate_diamond_ore" | "gold_ore" | "deepslate_gold_ore"
        | "emerald_ore" | "redstone_ore" | "deepslate_redstone_ore" => {
            ("iron_pickaxe", "make_iron_pickaxe")
        }
        "obsidian" => ("diamond_pickaxe", "make_diamond_pickaxe"),
        _ => return None,
    };
    Some(PickaxeRequirement { pickaxe, chain })
}

// ============================================================================
// Material sources
// ============================================================================

/// Where a missing crafting material comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialSource {
    pub block: &'static str,
    pub count: u32,
}

impl MaterialSource {
    /// Gathering step that restores the material, skipped once `item` or the raw drop is held.
    pub fn gather_step(&self, item: &str) -> Step {
        Step::search(Operation::mine(self.block, self.count), self.block)
            .with_skip_if(&[(item, self.count), (drop_for_block(self.block), self.count)])
    }
}

pub fn material_source(item: &str) -> Option<MaterialSource> {
    let (block, count) = match item {
        "raw_iron" | "iron_ingot" => ("iron_ore", 3),
        "coal" | "charcoal" => ("coal_ore", 3),
        "cobblestone" => ("stone", 8),
        "oak_log" | "oak_planks" | "stick" => ("oak_log", 3),
        "diamond" => ("diamond_ore", 3),
        "raw_gold" | "gold_ingot" => ("gold_ore", 3),
        "raw_copper" | "copper_ingot" => ("copper_ore", 3),
        _ => return None,
    };
    Some(MaterialSource { block, count })
}

// ============================================================================
// Search strategies
// ============================================================================

/// One static fallback for finding a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchStrategy {
    /// Run an action, then look for the target again.
    Act(Operation),
    /// Travel to a remembered location of the target, if any.
    CheckMemory,
}

fn explore(distance: u32) -> SearchStrategy {
    SearchStrategy::Act(Operation::Explore { distance })
}

fn find(block: &str, max_distance: u32) -> SearchStrategy {
    SearchStrategy::Act(Operation::find(block, max_distance))
}

fn dig_to(target_y: i32) -> SearchStrategy {
    SearchStrategy::Act(Operation::DigDown {
        depth: None,
        target_y: Some(target_y),
    })
}

fn dig_depth(depth: u32) -> SearchStrategy {
    SearchStrategy::Act(Operation::DigDown {
        depth: Some(depth),
        target_y: None,
    })
}

fn tunnel(direction: Direction, length: u32) -> SearchStrategy {
    SearchStrategy::Act(Operation::DigTunnel { direction, length })
}

pub const DEFAULT_SEARCH_STRATEGY: [u32; 2] = [30, 60];

/// Ordered fallbacks for `target`; unknown targets explore at two growing distances.
pub fn search_strategies(target: &str) -> Vec<SearchStrategy> {
    use Direction::*;
    match target {
        "oak_log" => vec![
            find("oak_log", 64),
            find("birch_log", 64),
            find("spruce_log", 64),
            explore(30),
            explore(50),
            explore(80),
        ],
        "birch_log" | "spruce_log" => vec![
            find(target, 64),
            find("oak_log", 64),
            explore(30),
            explore(50),
        ],
        "stone" => vec![find("stone", 32), dig_depth(5), tunnel(North, 10)],
        "iron_ore" => vec![
            find("iron_ore", 64),
            SearchStrategy::CheckMemory,
            dig_to(32),
            tunnel(North, 20),
            tunnel(East, 20),
            tunnel(South, 20),
            tunnel(West, 20),
            explore(40),
            dig_to(16),
            tunnel(North, 25),
            tunnel(East, 25),
        ],
        "coal_ore" => vec![
            find("coal_ore", 64),
            SearchStrategy::CheckMemory,
            dig_to(48),
            tunnel(West, 15),
            tunnel(North, 15),
            explore(30),
            dig_to(40),
            tunnel(East, 20),
            tunnel(South, 20),
        ],
        "diamond_ore" => vec![
            find("diamond_ore", 64),
            find("deepslate_diamond_ore", 64),
            SearchStrategy::CheckMemory,
            dig_to(-58),
            tunnel(North, 30),
            tunnel(East, 30),
            tunnel(South, 30),
            tunnel(West, 30),
            explore(40),
            dig_to(-58),
            tunnel(North, 40),
            tunnel(East, 40),
        ],
        "gold_ore" => vec![
            find("gold_ore", 64),
            SearchStrategy::CheckMemory,
            dig_to(16),
            tunnel(North, 20),
            tunnel(East, 20),
            explore(30),
            dig_to(-10),
            tunnel(South, 25),
        ],
        "cow" => vec![explore(30), explore(50), explore(80), explore(60), explore(100)],
        "pig" => vec![explore(30), explore(50), explore(80), explore(60)],
        "chicken" | "sheep" => vec![explore(30), explore(50), explore(80)],
        _ => DEFAULT_SEARCH_STRATEGY.iter().map(|d| explore(*d)).collect(),
    }
}

/// Depth the persistent phase digs toward when hunting `target` underground.
pub fn target_depth(target: &str) -> i32 {
    match target {
        "diamond_ore" | "deepslate_diamond_ore" | "redstone_ore" => -58,
        "gold_ore" | "lapis_ore" => 0,
        "iron_ore" | "copper_ore" => 16,
        "coal_ore" => 40,
        _ => 48,
    }
}

// ============================================================================
// Chain templates
// ============================================================================

pub fn builtin_templates() -> Vec<ChainTemplate> {
    vec![
        ChainTemplate::new(
            "get_wood",
            "Gather logs and turn them into planks and sticks",
            vec![
                Step::search(Operation::mine("oak_log", 6), "oak_log")
                    .with_skip_if(&[("oak_log", 6), ("oak_planks", 20)]),
                Step::craft(Operation::craft("oak_planks")).with_skip_if(&[("oak_planks", 16)]),
                Step::craft(Operation::craft("oak_planks")).with_skip_if(&[("oak_planks", 16)]),
                Step::craft(Operation::craft("stick")).with_skip_if(&[("stick", 8)]),
            ],
        ),
        ChainTemplate::new(
            "make_crafting_table",
            "Craft and place a crafting table",
            vec![
                Step::craft(Operation::craft("crafting_table"))
                    .with_skip_if(&[("crafting_table", 1)])
                    .with_skip_if_nearby("crafting_table"),
                Step::place(Operation::place("crafting_table")).with_skip_if_nearby("crafting_table"),
            ],
        ),
        ChainTemplate::new(
            "make_wooden_pickaxe",
            "Logs to planks and sticks to a wooden pickaxe",
            vec![
                Step::search(Operation::mine("oak_log", 6), "oak_log")
                    .with_skip_if(&[("oak_planks", 3), ("wooden_pickaxe", 1)]),
                Step::craft(Operation::craft("oak_planks"))
                    .with_skip_if(&[("oak_planks", 3), ("wooden_pickaxe", 1)]),
                Step::craft(Operation::craft("stick"))
                    .with_skip_if(&[("stick", 2), ("wooden_pickaxe", 1)]),
                Step::craft(Operation::craft("wooden_pickaxe")).with_skip_if(&[("wooden_pickaxe", 1)]),
                Step::action(Operation::equip("wooden_pickaxe", "hand")),
            ],
        ),
        ChainTemplate::new(
            "make_stone_pickaxe",
            "Cobblestone and sticks to a stone pickaxe",
            vec![
                Step::search(Operation::mine("stone", 3), "stone")
                    .with_skip_if(&[("cobblestone", 3), ("stone_pickaxe", 1)]),
                Step::craft(Operation::craft("stick"))
                    .with_skip_if(&[("stick", 2), ("stone_pickaxe", 1)]),
                Step::craft(Operation::craft("stone_pickaxe")).with_skip_if(&[("stone_pickaxe", 1)]),
                Step::action(Operation::equip("stone_pickaxe", "hand")),
            ],
        ),
        ChainTemplate::new(
            "find_food",
            "Hunt animals and eat",
            vec![
                Step::search(Operation::attack("cow"), "cow"),
                Step::search(Operation::attack("pig"), "pig"),
                Step::action(Operation::EatFood {}),
            ],
        ),
        ChainTemplate::new(
            "mine_stone",
            "Stock up on cobblestone",
            vec![
                Step::search(Operation::mine("stone", 32), "stone").with_skip_if(&[("cobblestone", 64)]),
                Step::search(Operation::mine("stone", 32), "stone").with_skip_if(&[("cobblestone", 64)]),
            ],
        ),
        ChainTemplate::new(
            "place_furnace",
            "Craft and place a furnace",
            vec![
                Step::search(Operation::mine("stone", 8), "stone")
                    .with_skip_if(&[("cobblestone", 8), ("furnace", 1)]),
                Step::craft(Operation::craft("furnace"))
                    .with_skip_if(&[("furnace", 1)])
                    .with_skip_if_nearby("furnace"),
                Step::place(Operation::place("furnace")).with_skip_if_nearby("furnace"),
            ],
        ),
        ChainTemplate::new(
            "place_chest",
            "Craft and place a storage chest",
            vec![
                Step::search(Operation::mine("oak_log", 2), "oak_log").with_skip_if(&[("oak_planks", 8)]),
                Step::craft(Operation::craft("oak_planks")).with_skip_if(&[("oak_planks", 8)]),
                Step::craft(Operation::craft("chest"))
                    .with_skip_if(&[("chest", 1)])
                    .with_skip_if_nearby("chest"),
                Step::place(Operation::place("chest")).with_skip_if_nearby("chest"),
            ],
        ),
        ChainTemplate::new(
            "build_shelter",
            "Gather materials and build an enclosed shelter",
            vec![
                Step::search(Operation::mine("oak_log", 2), "oak_log")
                    .with_skip_if(&[("oak_planks", 6), ("oak_door", 1)]),
                Step::craft(Operation::craft("oak_planks"))
                    .with_skip_if(&[("oak_planks", 6), ("oak_door", 1)]),
                Step::craft(Operation::craft("oak_door")).with_skip_if(&[("oak_door", 1)]),
                Step::search(Operation::mine("stone", 30), "stone").with_skip_if(&[("cobblestone", 25)]),
                Step::action(Operation::BuildShelter {}),
            ],
        ),
        ChainTemplate::new(
            "make_iron_pickaxe",
            "Mine and smelt iron into an iron pickaxe",
            vec![
                Step::search(Operation::mine("iron_ore", 3), "iron_ore").with_skip_if(&[
                    ("raw_iron", 3),
                    ("iron_ingot", 3),
                    ("iron_pickaxe", 1),
                ]),
                Step::search(Operation::mine("coal_ore", 3), "coal_ore").with_skip_if(&[
                    ("coal", 3),
                    ("charcoal", 3),
                    ("iron_pickaxe", 1),
                ]),
                Step::search(Operation::mine("stone", 8), "stone").with_skip_if(&[
                    ("cobblestone", 8),
                    ("furnace", 1),
                    ("iron_pickaxe", 1),
                ]),
                Step::craft(Operation::craft("furnace"))
                    .with_skip_if(&[("furnace", 1)])
                    .with_skip_if_nearby("furnace"),
                Step::place(Operation::place("furnace")).with_skip_if_nearby("furnace"),
                Step::craft(smelt("raw_iron", 3)).with_skip_if(&[("iron_ingot", 3), ("iron_pickaxe", 1)]),
                Step::craft(Operation::craft("stick"))
                    .with_skip_if(&[("stick", 2), ("iron_pickaxe", 1)]),
                Step::craft(Operation::craft("iron_pickaxe")).with_skip_if(&[("iron_pickaxe", 1)]),
                Step::action(Operation::equip("iron_pickaxe", "hand")),
            ],
        ),
        ChainTemplate::new(
            "make_iron_sword",
            "Mine and smelt iron into an iron sword",
            vec![
                Step::search(Operation::mine("iron_ore", 2), "iron_ore").with_skip_if(&[
                    ("raw_iron", 2),
                    ("iron_ingot", 2),
                    ("iron_sword", 1),
                ]),
                Step::search(Operation::mine("coal_ore", 2), "coal_ore").with_skip_if(&[
                    ("coal", 2),
                    ("charcoal", 2),
                    ("iron_sword", 1),
                ]),
                Step::craft(smelt("raw_iron", 2)).with_skip_if(&[("iron_ingot", 2), ("iron_sword", 1)]),
                Step::craft(Operation::craft("stick")).with_skip_if(&[("stick", 1), ("iron_sword", 1)]),
                Step::craft(Operation::craft("iron_sword")).with_skip_if(&[("iron_sword", 1)]),
                Step::action(Operation::equip("iron_sword", "hand")),
            ],
        ),
        ChainTemplate::new(
            "make_iron_armor",
            "Mine and smelt iron into a chestplate",
            vec![
                Step::search(Operation::mine("iron_ore", 8), "iron_ore").with_skip_if(&[
                    ("raw_iron", 8),
                    ("iron_ingot", 8),
                    ("iron_chestplate", 1),
                ]),
                Step::search(Operation::mine("coal_ore", 8), "coal_ore")
                    .with_skip_if(&[("coal", 8), ("iron_chestplate", 1)]),
                Step::craft(smelt("raw_iron", 8))
                    .with_skip_if(&[("iron_ingot", 8), ("iron_chestplate", 1)]),
                Step::craft(Operation::craft("iron_chestplate")).with_skip_if(&[("iron_chestplate", 1)]),
                Step::action(Operation::equip("iron_chestplate", "torso")),
            ],
        ),
        ChainTemplate::new(
            "make_shield",
            "Craft and equip a shield",
            vec![
                Step::craft(Operation::craft("shield")).with_skip_if(&[("shield", 1)]),
                Step::action(Operation::equip("shield", "off-hand")),
            ],
        ),
        ChainTemplate::new(
            "make_bucket",
            "Mine and smelt iron into a bucket",
            vec![
                Step::search(Operation::mine("iron_ore", 3), "iron_ore").with_skip_if(&[
                    ("raw_iron", 3),
                    ("iron_ingot", 3),
                    ("bucket", 1),
                ]),
                Step::craft(smelt("raw_iron", 3)).with_skip_if(&[("iron_ingot", 3), ("bucket", 1)]),
                Step::craft(Operation::craft("bucket")).with_skip_if(&[("bucket", 1)]),
            ],
        ),
        ChainTemplate::new(
            "mine_diamonds",
            "Descend to diamond level and mine diamonds",
            vec![
                Step::action(Operation::DigDown {
                    depth: None,
                    target_y: Some(-58),
                }),
                Step::action(Operation::DigTunnel {
                    direction: Direction::North,
                    length: 30,
                }),
                Step::search(Operation::mine("diamond_ore", 5), "diamond_ore")
                    .with_skip_if(&[("diamond", 5)]),
            ],
        ),
        ChainTemplate::new(
            "make_diamond_pickaxe",
            "Craft a diamond pickaxe",
            vec![
                Step::craft(Operation::craft("stick"))
                    .with_skip_if(&[("stick", 2), ("diamond_pickaxe", 1)]),
                Step::craft(Operation::craft("diamond_pickaxe")).with_skip_if(&[("diamond_pickaxe", 1)]),
                Step::action(Operation::equip("diamond_pickaxe", "hand")),
            ],
        ),
        ChainTemplate::new(
            "make_diamond_sword",
            "Craft a diamond sword",
            vec![
                Step::craft(Operation::craft("stick"))
                    .with_skip_if(&[("stick", 1), ("diamond_sword", 1)]),
                Step::craft(Operation::craft("diamond_sword")).with_skip_if(&[("diamond_sword", 1)]),
                Step::action(Operation::equip("diamond_sword", "hand")),
            ],
        ),
        ChainTemplate::new(
            "emergency_eat",
            "Eat something now",
            vec![Step::action(Operation::EatFood {})],
        ),
        ChainTemplate::new(
            "emergency_shelter",
            "Dig an emergency shelter",
            vec![Step::action(Operation::DigShelter {})],
        ),
    ]
}

fn smelt(item: &str, count: u32) -> Operation {
    Operation::SmeltItem {
        item_name: item.to_string(),
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::chain::StepKind;
    use std::collections::BTreeSet;

    #[test]
    fn template_names_are_unique() {
        let templates = builtin_templates();
        let names: BTreeSet<&str> = templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), templates.len());
        assert_eq!(templates.len(), 19);
    }

    #[test]
    fn wooden_pickaxe_starts_by_searching_for_logs() {
        let templates = builtin_templates();
        let chain = templates
            .iter()
            .find(|t| t.name == "make_wooden_pickaxe")
            .unwrap();
        let first = &chain.steps[0];
        assert_eq!(first.kind, StepKind::Search);
        assert_eq!(first.operation, Operation::mine("oak_log", 6));
    }

    #[test]
    fn every_prerequisite_chain_exists() {
        let templates = builtin_templates();
        for block in ["stone", "iron_ore", "diamond_ore", "obsidian"] {
            let requirement = required_pickaxe(block).unwrap();
            assert!(templates.iter().any(|t| t.name == requirement.chain));
        }
        assert_eq!(required_pickaxe("dirt"), None);
    }

    #[test]
    fn unknown_targets_use_default_exploration() {
        assert_eq!(
            search_strategies("mushroom"),
            vec![
                SearchStrategy::Act(Operation::Explore { distance: 30 }),
                SearchStrategy::Act(Operation::Explore { distance: 60 }),
            ]
        );
    }

    #[test]
    fn material_fix_step_skips_when_restored() {
        let source = material_source("iron_ingot").unwrap();
        let step = source.gather_step("iron_ingot");
        assert_eq!(step.operation, Operation::mine("iron_ore", 3));
        assert_eq!(step.skip_if.get("iron_ingot"), Some(&3));
        assert_eq!(step.skip_if.get("raw_iron"), Some(&3));
    }
}
