//! Chain model: steps, immutable templates, and the mutable run state of the active chain.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use super::config::EngineConfig;
use super::operation::Operation;
use super::types::{drop_for_block, ChainName, Inventory, ItemName};
use crate::geometry::BlockPos;

pub mod library;

pub use library::{
    builtin_templates, material_source, required_pickaxe, search_strategies, target_depth,
    MaterialSource, PickaxeRequirement, SearchStrategy, DEFAULT_SEARCH_STRATEGY,
};

// ============================================================================
// Step
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Craft,
    Gather,
    Search,
    Place,
    #[default]
    #[serde(alias = "misc")]
    Action,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Craft => "craft",
            StepKind::Gather => "gather",
            StepKind::Search => "search",
            StepKind::Place => "place",
            StepKind::Action => "action",
        }
    }
}

/// One unit of chain work.
///
/// On disk a step reads `{"tool", "args", "type", "skip_if", "skip_if_nearby", "search_target"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub operation: Operation,
    #[serde(rename = "type", default)]
    pub kind: StepKind,
    /// Skip when ANY listed item is held at or above its count.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub skip_if: BTreeMap<ItemName, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if_nearby: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_target: Option<String>,
}

impl Step {
    pub fn new(kind: StepKind, operation: Operation) -> Self {
        Self {
            operation,
            kind,
            skip_if: BTreeMap::new(),
            skip_if_nearby: None,
            search_target: None,
        }
    }

    pub fn craft(operation: Operation) -> Self {
        Self::new(StepKind::Craft, operation)
    }

    pub fn place(operation: Operation) -> Self {
        Self::new(StepKind::Place, operation)
    }

    pub fn action(operation: Operation) -> Self {
        Self::new(StepKind::Action, operation)
    }

    pub fn gather(operation: Operation) -> Self {
        Self::new(StepKind::Gather, operation)
    }

    pub fn search(operation: Operation, target: impl Into<String>) -> Self {
        let mut step = Self::new(StepKind::Search, operation);
        step.search_target = Some(target.into());
        step
    }

    pub fn with_skip_if(mut self, entries: &[(&str, u32)]) -> Self {
        for (item, count) in entries {
            self.skip_if.insert((*item).to_string(), *count);
        }
        self
    }

    pub fn with_skip_if_nearby(mut self, block: impl Into<String>) -> Self {
        self.skip_if_nearby = Some(block.into());
        self
    }

    /// True when any `skip_if` entry is met by the inventory.
    pub fn inventory_satisfies(&self, inventory: &Inventory) -> bool {
        self.skip_if
            .iter()
            .any(|(item, count)| inventory.count(item) >= *count)
    }

    /// Resource this step hunts for when its direct attempt fails.
    pub fn target(&self) -> Option<&str> {
        if let Some(target) = self.search_target.as_deref() {
            return Some(target);
        }
        match &self.operation {
            Operation::MineBlock { block_type, .. } => Some(block_type.as_str()),
            Operation::AttackEntity { entity_type } if !entity_type.is_empty() => {
                Some(entity_type.as_str())
            }
            _ => None,
        }
    }

    /// Item whose count proves a mining step worked.
    pub fn drop_item(&self) -> Option<&str> {
        self.operation.mined_block().map(drop_for_block)
    }

    /// Rough wall-clock budget for this step inside a chain.
    pub fn estimated_duration(&self) -> Duration {
        let secs = match &self.operation {
            Operation::MineBlock { count, .. } => 20 + u64::from(*count) * 10,
            Operation::SmeltItem { count, .. } => 15 + u64::from(*count) * 10,
            op if op.is_excavation() => 180,
            Operation::MoveTo { .. } | Operation::Explore { .. } => 60,
            Operation::AttackEntity { .. } => 45,
            Operation::CraftItem { .. }
            | Operation::PlaceBlock { .. }
            | Operation::EquipItem { .. }
            | Operation::EatFood {} => 10,
            _ => 15,
        };
        let search_allowance = if self.kind == StepKind::Search { 60 } else { 0 };
        Duration::from_secs(secs + search_allowance)
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Immutable chain definition. Runs are built from a deep copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTemplate {
    pub name: ChainName,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
}

impl ChainTemplate {
    pub fn new(name: impl Into<String>, description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
        }
    }
}

/// Builds a per-run chain from a template without touching the template.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    name: ChainName,
    steps: Vec<Step>,
    custom: bool,
}

impl ChainBuilder {
    pub fn from_template(template: &ChainTemplate) -> Self {
        Self {
            name: template.name.clone(),
            steps: template.steps.clone(),
            custom: false,
        }
    }

    /// Raises (never lowers) `skip_if` thresholds for items the caller needs more of.
    pub fn with_overrides(mut self, overrides: &BTreeMap<ItemName, u32>) -> Self {
        for step in &mut self.steps {
            for (item, threshold) in step.skip_if.iter_mut() {
                if let Some(needed) = overrides.get(item) {
                    if *needed > *threshold {
                        *threshold = *needed;
                    }
                }
            }
        }
        self
    }

    pub fn custom(mut self, custom: bool) -> Self {
        self.custom = custom;
        self
    }

    pub fn build(self, started_at: Instant, config: &EngineConfig) -> Chain {
        let timeout = estimate_timeout(&self.steps, config);
        Chain {
            name: self.name,
            steps: self.steps,
            cursor: 0,
            retry_count: 0,
            search: SearchCursor::default(),
            mine_goal: None,
            started_at,
            timeout,
            injections: 0,
            material_fixes: BTreeSet::new(),
            replayed_solutions: BTreeSet::new(),
            custom: self.custom,
        }
    }
}

/// Sum of per-step budgets clamped to the configured floor and ceiling.
pub fn estimate_timeout(steps: &[Step], config: &EngineConfig) -> Duration {
    let total: Duration = steps.iter().map(Step::estimated_duration).sum();
    total.clamp(config.chain_timeout_floor, config.chain_timeout_ceiling)
}

// ============================================================================
// Run state
// ============================================================================

/// Search progress for the current step. Never decreases until the step changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCursor {
    pub scouted: bool,
    pub static_index: usize,
    pub persistent_index: u32,
    pub history: Vec<String>,
    /// Caves already travelled to during the persistent phase.
    pub visited_caves: Vec<BlockPos>,
}

/// Two cave records closer than this are the same cave.
const SAME_CAVE_RADIUS: f64 = 1.5;

impl SearchCursor {
    /// Total number of search actions taken for this step.
    pub fn position(&self) -> usize {
        self.static_index + self.persistent_index as usize + usize::from(self.scouted)
    }

    pub fn cave_visited(&self, cave: BlockPos) -> bool {
        self.visited_caves
            .iter()
            .any(|visited| visited.distance_to(cave) <= SAME_CAVE_RADIUS)
    }
}

/// Inventory count a mining step must reach before it may advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MineGoal {
    pub item: ItemName,
    pub target: u32,
}

impl MineGoal {
    pub fn remaining(&self, inventory: &Inventory) -> u32 {
        self.target.saturating_sub(inventory.count(&self.item))
    }
}

/// The single active chain.
#[derive(Debug, Clone)]
pub struct Chain {
    name: ChainName,
    steps: Vec<Step>,
    cursor: usize,
    retry_count: u32,
    search: SearchCursor,
    mine_goal: Option<MineGoal>,
    started_at: Instant,
    timeout: Duration,
    injections: u32,
    /// Materials whose gathering fix was already injected in this run.
    material_fixes: BTreeSet<ItemName>,
    /// `tool:keyword` pairs whose learned solution was already replayed.
    replayed_solutions: BTreeSet<String>,
    custom: bool,
}

impl Chain {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.cursor)
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn search(&self) -> &SearchCursor {
        &self.search
    }

    pub(crate) fn search_mut(&mut self) -> &mut SearchCursor {
        &mut self.search
    }

    pub fn mine_goal(&self) -> Option<&MineGoal> {
        self.mine_goal.as_ref()
    }

    pub(crate) fn set_mine_goal(&mut self, goal: MineGoal) {
        self.mine_goal = Some(goal);
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        self.elapsed(now) > self.timeout
    }

    pub fn injections(&self) -> u32 {
        self.injections
    }

    pub fn is_custom(&self) -> bool {
        self.custom
    }

    /// Moves to the next step and clears all per-step state.
    pub(crate) fn advance(&mut self) {
        self.cursor += 1;
        self.retry_count = 0;
        self.search = SearchCursor::default();
        self.mine_goal = None;
    }

    pub(crate) fn record_failure(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Inserts `steps` before the current step and restarts per-step state.
    ///
    /// The chain timeout is re-estimated from the new composition, never below
    /// the current limit.
    pub(crate) fn splice_before_current(&mut self, steps: Vec<Step>, config: &EngineConfig) {
        let at = self.cursor.min(self.steps.len());
        self.steps.splice(at..at, steps);
        self.retry_count = 0;
        self.search = SearchCursor::default();
        self.mine_goal = None;
        self.timeout = self.timeout.max(estimate_timeout(&self.steps, config));
    }

    /// Prerequisite splice counted against the per-chain injection limit.
    pub(crate) fn inject_prerequisite(&mut self, steps: Vec<Step>, config: &EngineConfig) {
        self.injections += 1;
        self.splice_before_current(steps, config);
    }

    pub fn can_inject(&self, config: &EngineConfig) -> bool {
        self.injections < config.max_injections
    }

    /// Marks `item` as fixed once; false when a fix was already tried.
    pub(crate) fn mark_material_fix(&mut self, item: &str) -> bool {
        self.material_fixes.insert(item.to_string())
    }

    pub fn solution_replayed(&self, key: &str) -> bool {
        self.replayed_solutions.contains(key)
    }

    /// Splices a learned solution, counted against the injection limit.
    pub(crate) fn replay_solution(&mut self, key: String, steps: Vec<Step>, config: &EngineConfig) {
        self.replayed_solutions.insert(key);
        self.inject_prerequisite(steps, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_template() -> ChainTemplate {
        ChainTemplate::new(
            "sample",
            "",
            vec![
                Step::search(Operation::mine("oak_log", 2), "oak_log")
                    .with_skip_if(&[("oak_planks", 3), ("wooden_pickaxe", 1)]),
                Step::craft(Operation::craft("wooden_pickaxe")).with_skip_if(&[("wooden_pickaxe", 1)]),
            ],
        )
    }

    #[test]
    fn step_parses_on_disk_shape() {
        let step: Step = serde_json::from_value(json!({
            "tool": "mine_block",
            "args": { "block_type": "iron_ore", "count": 3 },
            "type": "search",
            "skip_if": { "raw_iron": 3 },
            "search_target": "iron_ore",
        }))
        .unwrap();
        assert_eq!(step.operation, Operation::mine("iron_ore", 3));
        assert_eq!(step.kind, StepKind::Search);
        assert_eq!(step.skip_if.get("raw_iron"), Some(&3));
        assert_eq!(step.target(), Some("iron_ore"));
        assert_eq!(step.drop_item(), Some("raw_iron"));

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back["tool"], "mine_block");
        assert_eq!(back["type"], "search");
    }

    #[test]
    fn skip_if_matches_any_entry() {
        let step = Step::craft(Operation::craft("stick")).with_skip_if(&[("stick", 2), ("wooden_pickaxe", 1)]);
        assert!(!step.inventory_satisfies(&Inventory::from_pairs([("stick", 1)])));
        assert!(step.inventory_satisfies(&Inventory::from_pairs([("wooden_pickaxe", 1)])));
        assert!(step.inventory_satisfies(&Inventory::from_pairs([("stick", 5)])));
    }

    #[test]
    fn overrides_only_raise_thresholds() {
        let template = sample_template();
        let overrides = BTreeMap::from([
            ("oak_planks".to_string(), 20),
            ("wooden_pickaxe".to_string(), 0),
        ]);
        let chain = ChainBuilder::from_template(&template)
            .with_overrides(&overrides)
            .build(Instant::now(), &EngineConfig::default());

        assert_eq!(chain.steps()[0].skip_if.get("oak_planks"), Some(&20));
        assert_eq!(chain.steps()[0].skip_if.get("wooden_pickaxe"), Some(&1));
        assert_eq!(template.steps[0].skip_if.get("oak_planks"), Some(&3));
    }

    #[test]
    fn timeout_is_clamped() {
        let config = EngineConfig::default();
        let short = vec![Step::craft(Operation::craft("stick"))];
        assert_eq!(estimate_timeout(&short, &config), config.chain_timeout_floor);

        let long: Vec<Step> = (0..20)
            .map(|_| Step::search(Operation::mine("iron_ore", 16), "iron_ore"))
            .collect();
        assert_eq!(estimate_timeout(&long, &config), config.chain_timeout_ceiling);

        let mid = vec![
            Step::search(Operation::mine("iron_ore", 8), "iron_ore"),
            Step::action(Operation::DigDown { depth: None, target_y: Some(16) }),
        ];
        assert_eq!(estimate_timeout(&mid, &config), Duration::from_secs(100 + 60 + 180));
    }

    #[test]
    fn splice_resets_step_state_and_keeps_cursor() {
        let config = EngineConfig::default();
        let mut chain = ChainBuilder::from_template(&sample_template()).build(Instant::now(), &config);
        chain.record_failure();
        chain.search_mut().static_index = 2;

        chain.inject_prerequisite(vec![Step::craft(Operation::craft("oak_planks"))], &config);
        assert_eq!(chain.cursor(), 0);
        assert_eq!(chain.retry_count(), 0);
        assert_eq!(chain.search().static_index, 0);
        assert_eq!(chain.injections(), 1);
        assert_eq!(chain.steps().len(), 3);
        assert_eq!(chain.current_step().map(|s| &s.operation), Some(&Operation::craft("oak_planks")));
    }
}
