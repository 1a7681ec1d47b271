//! Game-bot behavior engine: reactive instincts, multi-step chains, resource
//! search, and escalation to an external planner.
//!
//! This module is organized into submodules:
//! - `types`: inventory and item knowledge tables
//! - `snapshot`: per-tick world and threat views
//! - `operation`: the closed set of remote operations
//! - `gateway`: Action Gateway trait and HTTP client
//! - `instinct`: reactive survival rules
//! - `chain`: steps, templates, run state, built-in library
//! - `custom_chains`: planner-authored chains
//! - `search`: phased resource search
//! - `memory`: locations, error solutions, experience store
//! - `executor`: the chain state machine and failure handling
//! - `escalation`: reports, planner directives, planner clients
//! - `controller`: per-tick control flow and metrics

mod chain;
mod clock;
mod config;
mod context;
mod controller;
mod custom_chains;
mod error;
mod escalation;
mod executor;
mod gateway;
mod instinct;
mod memory;
mod operation;
mod persist;
mod search;
mod snapshot;
mod types;

#[cfg(test)]
mod test_support;

pub use chain::{
    builtin_templates, estimate_timeout, material_source, required_pickaxe, search_strategies,
    target_depth, Chain, ChainBuilder, ChainTemplate, MaterialSource, MineGoal, PickaxeRequirement,
    SearchCursor, SearchStrategy, Step, StepKind, DEFAULT_SEARCH_STRATEGY,
};
pub use clock::{Clock, SystemClock};
pub use config::{
    AgentConfig, EngineConfig, GatewayConfig, HttpPlannerConfig, DEFAULT_BOT_API_URL,
    DEFAULT_CONFIG_FILE_NAME, DEFAULT_PLANNER_TIMEOUT_MS, ENV_BOT_API_URL,
    ENV_PLANNER_TIMEOUT_MS, ENV_PLANNER_URL, ENV_QUERY_TIMEOUT_MS, ENV_RETRY_CEILING,
};
pub use context::EngineContext;
pub use controller::{
    AgentController, ControlLayer, ControlResult, ControlTick, ControllerMetrics,
    DirectiveOutcome,
};
pub use custom_chains::{
    validate_chain, ChainLibrary, CustomChain, CustomChainStore, MAX_CUSTOM_STEPS,
};
pub use error::{ChainDefinitionError, ConfigError, GatewayError, PersistError, PlannerError};
pub use escalation::{
    EscalationDetail, EscalationReason, EscalationReport, HttpPlanner, PlanRequest, Planner,
    PlannerDirective, QueuePlanner,
};
pub use executor::{ChainExecutor, StartStatus, TickOutcome, TickResult};
pub use gateway::{ActionGateway, ActionOutcome, Cavity, HttpActionGateway};
pub use instinct::{InstinctAction, InstinctLayer, InstinctOutcome, InstinctRule};
pub use memory::{
    error_keyword, ErrorSolution, ErrorSolutionMemory, ExperienceMemory, ExperienceStore,
    LocationEntry, LocationMemory, LocationPolicy, RecordOutcome, SearchRecord, CAVE_KEY,
    SHELTER_KEY,
};
pub use operation::{Direction, Endpoint, HttpMethod, Operation};
pub use search::{is_underground_target, SearchPhase, CAVE_SCAN_RADIUS, FIND_RANGE};
pub use snapshot::{
    CombatStatus, Environment, NearbyEntity, Recommendation, ThreatDetail, ThreatSnapshot,
    TimePhase, WorldSnapshot,
};
pub use types::{
    drop_for_block, is_food, is_ore, is_weapon, pickaxe_tier, ChainName, Inventory, InventorySlot,
    ItemName, FOOD_ITEMS, LOG_TYPES, PICKAXE_TIERS, STATION_BLOCKS,
};
