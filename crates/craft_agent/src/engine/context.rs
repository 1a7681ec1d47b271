//! Collaborators handed to every chain tick.

use std::time::Instant;
use tracing::{debug, warn};

use super::chain::Step;
use super::clock::Clock;
use super::config::EngineConfig;
use super::custom_chains::ChainLibrary;
use super::gateway::ActionGateway;
use super::memory::{ExperienceStore, SHELTER_KEY};
use super::operation::Operation;
use super::types::{Inventory, STATION_BLOCKS};
use crate::geometry::BlockPos;

/// Everything the chain and search layers touch, passed explicitly per call.
pub struct EngineContext<'a> {
    pub gateway: &'a dyn ActionGateway,
    pub clock: &'a dyn Clock,
    pub experience: &'a mut dyn ExperienceStore,
    pub library: &'a mut ChainLibrary,
    pub config: &'a EngineConfig,
}

impl<'a> EngineContext<'a> {
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn unix_time(&self) -> u64 {
        self.clock.unix_time()
    }

    /// Live inventory, or `fallback` when the query fails.
    pub fn inventory_or(&self, fallback: &Inventory) -> Inventory {
        match self.gateway.inventory() {
            Ok(inventory) => inventory,
            Err(err) => {
                warn!(error = %err, "inventory query failed, using last known inventory");
                fallback.clone()
            }
        }
    }

    pub fn position(&self) -> Option<BlockPos> {
        match self.gateway.position() {
            Ok(position) => Some(position),
            Err(err) => {
                warn!(error = %err, "position query failed");
                None
            }
        }
    }

    /// Remembers where a station was placed or a shelter dug after `operation` succeeded.
    pub fn remember_site(&mut self, operation: &Operation) {
        let key = match operation {
            Operation::PlaceBlock { block_name } if STATION_BLOCKS.contains(&block_name.as_str()) => {
                block_name.as_str()
            }
            Operation::DigShelter {} | Operation::BuildShelter {} => SHELTER_KEY,
            _ => return,
        };
        let Some(position) = self.position() else {
            return;
        };
        let now = self.unix_time();
        let outcome = self
            .experience
            .record_search_success(key, operation.name(), Some(position), now);
        debug!(site = key, position = %position, outcome = ?outcome, "site remembered");
    }

    /// Steps of a library chain, used for prerequisite splices.
    pub fn chain_steps(&self, name: &str) -> Option<Vec<Step>> {
        self.library.template(name).map(|(template, _)| template.steps)
    }
}
