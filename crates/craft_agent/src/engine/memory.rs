//! Experience memory: where resources were found and which fixes worked for which errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::chain::Step;
use super::config::EngineConfig;
use super::error::PersistError;
use super::persist::{read_json_or_default, write_json_to_path};
use crate::geometry::BlockPos;

pub const CAVE_KEY: &str = "cave";
pub const SHELTER_KEY: &str = "shelter";
pub const CAVE_CAPACITY: usize = 10;
pub const CAVE_DEDUP_RADIUS: f64 = 32.0;
pub const SHELTER_CAPACITY: usize = 3;

/// Minimum separation below which a removal request matches a stored entry.
const SAME_SPOT_RADIUS: f64 = 1.5;

// ============================================================================
// Location memory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub position: BlockPos,
    pub method: String,
    /// Unix seconds of the most recent find at this spot.
    pub found_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationPolicy {
    pub capacity: usize,
    pub dedup_radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Merged,
    /// Inserted after evicting the oldest entry.
    Evicted,
}

/// Bounded, deduplicated lists of known positions per resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMemory {
    #[serde(default)]
    entries: BTreeMap<String, Vec<LocationEntry>>,
    #[serde(skip, default = "default_policy")]
    policy: LocationPolicy,
}

fn default_policy() -> LocationPolicy {
    let config = EngineConfig::default();
    LocationPolicy {
        capacity: config.location_capacity,
        dedup_radius: config.dedup_radius,
    }
}

impl Default for LocationMemory {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            policy: default_policy(),
        }
    }
}

impl LocationMemory {
    pub fn new(capacity: usize, dedup_radius: f64) -> Self {
        Self {
            entries: BTreeMap::new(),
            policy: LocationPolicy {
                capacity: capacity.max(1),
                dedup_radius,
            },
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.location_capacity, config.dedup_radius)
    }

    fn policy_for(&self, target: &str) -> LocationPolicy {
        match target {
            CAVE_KEY => LocationPolicy {
                capacity: CAVE_CAPACITY,
                dedup_radius: CAVE_DEDUP_RADIUS,
            },
            SHELTER_KEY => LocationPolicy {
                capacity: SHELTER_CAPACITY,
                dedup_radius: self.policy.dedup_radius,
            },
            _ => self.policy,
        }
    }

    /// Records a find, merging with the closest entry inside the dedup radius.
    pub fn record(
        &mut self,
        target: &str,
        position: BlockPos,
        method: &str,
        now: u64,
    ) -> RecordOutcome {
        let policy = self.policy_for(target);
        let list = self.entries.entry(target.to_string()).or_default();

        let closest = list
            .iter_mut()
            .map(|entry| (entry.position.distance_to(position), entry))
            .filter(|(distance, _)| *distance < policy.dedup_radius)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((_, entry)) = closest {
            entry.position = position;
            entry.method = method.to_string();
            entry.found_at = now;
            return RecordOutcome::Merged;
        }

        list.push(LocationEntry {
            position,
            method: method.to_string(),
            found_at: now,
        });
        if list.len() > policy.capacity {
            if let Some(oldest) = list
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.found_at)
                .map(|(idx, _)| idx)
            {
                list.remove(oldest);
            }
            return RecordOutcome::Evicted;
        }
        RecordOutcome::Inserted
    }

    /// Nearest remembered position of `target` within `max_distance` of `from`.
    pub fn nearest(&self, target: &str, from: BlockPos, max_distance: f64) -> Option<&LocationEntry> {
        self.entries
            .get(target)?
            .iter()
            .map(|entry| (entry.position.distance_to(from), entry))
            .filter(|(distance, _)| *distance <= max_distance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, entry)| entry)
    }

    /// Entries sorted nearest first.
    pub fn sorted_by_distance(&self, target: &str, from: BlockPos) -> Vec<LocationEntry> {
        let mut entries = self.entries(target).to_vec();
        entries.sort_by(|a, b| {
            a.position
                .distance_to(from)
                .total_cmp(&b.position.distance_to(from))
        });
        entries
    }

    /// Drops entries at `position`. Returns true when anything was removed.
    pub fn remove(&mut self, target: &str, position: BlockPos) -> bool {
        let Some(list) = self.entries.get_mut(target) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| entry.position.distance_to(position) > SAME_SPOT_RADIUS);
        let removed = list.len() != before;
        if list.is_empty() {
            self.entries.remove(target);
        }
        removed
    }

    pub fn entries(&self, target: &str) -> &[LocationEntry] {
        self.entries.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// One line per target: nearest known spot and its distance from `from`.
    pub fn summary(&self, from: BlockPos, limit: usize) -> String {
        let mut lines: Vec<(f64, String)> = self
            .entries
            .iter()
            .filter_map(|(target, list)| {
                list.iter()
                    .map(|entry| (entry.position.distance_to(from), entry))
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                    .map(|(distance, entry)| {
                        (
                            distance,
                            format!("{target} at {} ({distance:.0} blocks)", entry.position),
                        )
                    })
            })
            .collect();
        lines.sort_by(|a, b| a.0.total_cmp(&b.0));
        lines
            .into_iter()
            .take(limit)
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_policy(&mut self, capacity: usize, dedup_radius: f64) {
        self.policy = LocationPolicy {
            capacity: capacity.max(1),
            dedup_radius,
        };
    }
}

// ============================================================================
// Error solutions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSolution {
    pub operation: String,
    pub keyword: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub last_used: u64,
}

/// Corrective step sequences keyed by `(operation, error keyword)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSolutionMemory {
    #[serde(default)]
    solutions: Vec<ErrorSolution>,
}

impl ErrorSolutionMemory {
    pub fn record(&mut self, operation: &str, keyword: &str, steps: Vec<Step>, now: u64) {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() || steps.is_empty() {
            return;
        }
        if let Some(existing) = self
            .solutions
            .iter_mut()
            .find(|solution| solution.operation == operation && solution.keyword == keyword)
        {
            existing.steps = steps;
            existing.success_count += 1;
            existing.last_used = now;
            return;
        }
        self.solutions.push(ErrorSolution {
            operation: operation.to_string(),
            keyword,
            steps,
            success_count: 1,
            last_used: now,
        });
    }

    /// First stored solution for `operation` whose keyword occurs in the error text.
    pub fn lookup(&self, operation: &str, error_message: &str) -> Option<&ErrorSolution> {
        let error = error_message.to_lowercase();
        self.solutions
            .iter()
            .find(|solution| solution.operation == operation && error.contains(&solution.keyword))
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }
}

/// Lowercased leading clause of an error message, used as a solution key.
pub fn error_keyword(error_message: &str) -> String {
    let lowered = error_message.trim().to_lowercase();
    let clause = lowered
        .split(|ch: char| matches!(ch, '.' | ':' | ';' | '!' | '(' | '\n' | ','))
        .map(str::trim)
        .find(|clause| !clause.is_empty())
        .unwrap_or("");
    clause
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Experience store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub method: String,
    pub success_count: u32,
    pub last_used: u64,
}

/// Read/record interface the engine uses for all learned knowledge.
pub trait ExperienceStore {
    fn record_search_success(
        &mut self,
        target: &str,
        method: &str,
        location: Option<BlockPos>,
        now: u64,
    ) -> Option<RecordOutcome>;

    /// Nearest known location of `target` within `max_distance`.
    fn search_hint(&self, target: &str, from: BlockPos, max_distance: f64) -> Option<LocationEntry>;

    fn remove_location(&mut self, target: &str, location: BlockPos) -> bool;

    fn record_error_solution(&mut self, operation: &str, keyword: &str, steps: Vec<Step>, now: u64);

    fn error_solution(&self, operation: &str, error_message: &str) -> Option<Vec<Step>>;

    fn locations_by_distance(&self, target: &str, from: BlockPos) -> Vec<LocationEntry>;

    /// Short description of past successes for `target`, empty when none.
    fn lesson_context(&self, target: &str) -> String;

    fn location_context(&self, from: BlockPos) -> String;
}

/// Experience store kept in memory and mirrored to a JSON file when a path is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceMemory {
    #[serde(default)]
    search_successes: BTreeMap<String, SearchRecord>,
    #[serde(default)]
    locations: LocationMemory,
    #[serde(default)]
    error_solutions: ErrorSolutionMemory,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl ExperienceMemory {
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self {
            locations: LocationMemory::from_config(config),
            ..Self::default()
        }
    }

    /// Loads `path` when present and saves back to it after every change.
    pub fn open(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let mut memory: Self = read_json_or_default(path)?;
        memory
            .locations
            .set_policy(config.location_capacity, config.dedup_radius);
        memory.path = Some(path.to_path_buf());
        debug!(
            path = %path.display(),
            searches = memory.search_successes.len(),
            solutions = memory.error_solutions.len(),
            "experience memory loaded"
        );
        Ok(memory)
    }

    pub fn save(&self) -> Result<(), PersistError> {
        match &self.path {
            Some(path) => write_json_to_path(self, path),
            None => Ok(()),
        }
    }

    pub fn locations(&self) -> &LocationMemory {
        &self.locations
    }

    pub fn error_solutions(&self) -> &ErrorSolutionMemory {
        &self.error_solutions
    }

    pub fn search_record(&self, target: &str) -> Option<&SearchRecord> {
        self.search_successes.get(target)
    }

    fn persist(&self) {
        if let Err(err) = self.save() {
            warn!(error = %err, "failed to save experience memory");
        }
    }
}

impl ExperienceStore for ExperienceMemory {
    fn record_search_success(
        &mut self,
        target: &str,
        method: &str,
        location: Option<BlockPos>,
        now: u64,
    ) -> Option<RecordOutcome> {
        let record = self
            .search_successes
            .entry(target.to_string())
            .or_insert_with(|| SearchRecord {
                method: method.to_string(),
                success_count: 0,
                last_used: now,
            });
        record.method = method.to_string();
        record.success_count += 1;
        record.last_used = now;

        let outcome = location.map(|position| self.locations.record(target, position, method, now));
        self.persist();
        outcome
    }

    fn search_hint(&self, target: &str, from: BlockPos, max_distance: f64) -> Option<LocationEntry> {
        self.locations.nearest(target, from, max_distance).cloned()
    }

    fn remove_location(&mut self, target: &str, location: BlockPos) -> bool {
        let removed = self.locations.remove(target, location);
        if removed {
            self.persist();
        }
        removed
    }

    fn record_error_solution(&mut self, operation: &str, keyword: &str, steps: Vec<Step>, now: u64) {
        self.error_solutions.record(operation, keyword, steps, now);
        self.persist();
    }

    fn error_solution(&self, operation: &str, error_message: &str) -> Option<Vec<Step>> {
        self.error_solutions
            .lookup(operation, error_message)
            .map(|solution| solution.steps.clone())
    }

    fn locations_by_distance(&self, target: &str, from: BlockPos) -> Vec<LocationEntry> {
        self.locations.sorted_by_distance(target, from)
    }

    fn lesson_context(&self, target: &str) -> String {
        let Some(record) = self.search_successes.get(target) else {
            return String::new();
        };
        let mut line = format!(
            "Past success finding {target}: {} (worked {}x)",
            record.method, record.success_count
        );
        if let Some(entry) = self
            .locations
            .entries(target)
            .iter()
            .max_by_key(|entry| entry.found_at)
        {
            line.push_str(&format!("; last found at {}", entry.position));
        }
        line
    }

    fn location_context(&self, from: BlockPos) -> String {
        self.locations.summary(from, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::operation::Operation;

    fn pos(x: f64, y: f64, z: f64) -> BlockPos {
        BlockPos::new(x, y, z)
    }

    #[test]
    fn nearby_finds_merge_into_one_entry() {
        let mut memory = LocationMemory::new(5, 16.0);
        assert_eq!(
            memory.record("iron_ore", pos(0.0, 30.0, 0.0), "dig_down", 10),
            RecordOutcome::Inserted
        );
        assert_eq!(
            memory.record("iron_ore", pos(5.0, 30.0, 5.0), "dig_tunnel", 20),
            RecordOutcome::Merged
        );
        let entries = memory.entries("iron_ore");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].method, "dig_tunnel");
        assert_eq!(entries[0].found_at, 20);
    }

    #[test]
    fn oldest_entry_is_evicted_over_capacity() {
        let mut memory = LocationMemory::new(2, 4.0);
        memory.record("coal_ore", pos(0.0, 40.0, 0.0), "a", 30);
        memory.record("coal_ore", pos(100.0, 40.0, 0.0), "b", 10);
        let outcome = memory.record("coal_ore", pos(200.0, 40.0, 0.0), "c", 50);
        assert_eq!(outcome, RecordOutcome::Evicted);
        let methods: Vec<&str> = memory
            .entries("coal_ore")
            .iter()
            .map(|entry| entry.method.as_str())
            .collect();
        assert_eq!(methods, vec!["a", "c"]);
    }

    #[test]
    fn caves_use_their_own_policy() {
        let mut memory = LocationMemory::new(5, 4.0);
        memory.record(CAVE_KEY, pos(0.0, 20.0, 0.0), "scan", 1);
        assert_eq!(
            memory.record(CAVE_KEY, pos(20.0, 20.0, 0.0), "scan", 2),
            RecordOutcome::Merged
        );
        for idx in 0..12 {
            memory.record(CAVE_KEY, pos(100.0 * f64::from(idx + 1), 20.0, 0.0), "scan", 10 + idx as u64);
        }
        assert_eq!(memory.entries(CAVE_KEY).len(), CAVE_CAPACITY);
    }

    #[test]
    fn nearest_respects_distance_cap_and_removal() {
        let mut memory = LocationMemory::new(5, 4.0);
        memory.record("stone", pos(10.0, 64.0, 0.0), "direct", 1);
        memory.record("stone", pos(300.0, 64.0, 0.0), "direct", 2);
        let origin = pos(0.0, 64.0, 0.0);
        assert_eq!(
            memory.nearest("stone", origin, 128.0).map(|e| e.position),
            Some(pos(10.0, 64.0, 0.0))
        );
        assert!(memory.remove("stone", pos(10.0, 64.0, 0.0)));
        assert!(memory.nearest("stone", origin, 128.0).is_none());
        assert!(!memory.remove("stone", pos(10.0, 64.0, 0.0)));
    }

    #[test]
    fn error_solutions_match_by_keyword() {
        let mut solutions = ErrorSolutionMemory::default();
        let steps = vec![Step::place(Operation::place("crafting_table"))];
        solutions.record("craft_item", "No crafting table nearby", steps.clone(), 5);
        assert_eq!(
            solutions
                .lookup("craft_item", "Failed: no crafting table nearby (need one)")
                .map(|s| s.steps.clone()),
            Some(steps)
        );
        assert!(solutions.lookup("smelt_item", "no crafting table nearby").is_none());
    }

    #[test]
    fn keyword_is_leading_clause() {
        assert_eq!(
            error_keyword("No crafting table nearby. Place one first"),
            "no crafting table nearby"
        );
        assert_eq!(
            error_keyword("Missing materials: need 3 oak_planks"),
            "missing materials"
        );
    }

    #[test]
    fn experience_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experience.json");
        let config = EngineConfig::default();

        let mut memory = ExperienceMemory::open(&path, &config).unwrap();
        memory.record_search_success("iron_ore", "dig_down", Some(pos(1.0, 16.0, 2.0)), 42);
        memory.record_error_solution(
            "place_block",
            "no suitable position",
            vec![Step::gather(Operation::mine("dirt", 1))],
            43,
        );

        let reloaded = ExperienceMemory::open(&path, &config).unwrap();
        assert_eq!(reloaded.search_record("iron_ore").map(|r| r.success_count), Some(1));
        assert!(reloaded
            .search_hint("iron_ore", pos(0.0, 16.0, 0.0), 64.0)
            .is_some());
        assert!(reloaded
            .error_solution("place_block", "No suitable position to place")
            .is_some());
        assert!(reloaded.lesson_context("iron_ore").contains("dig_down"));
    }
}
