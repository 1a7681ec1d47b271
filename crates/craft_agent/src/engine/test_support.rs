//! Scripted collaborators shared by the engine unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use super::clock::Clock;
use super::error::GatewayError;
use super::gateway::{ActionGateway, ActionOutcome, Cavity};
use super::operation::Operation;
use super::snapshot::{ThreatSnapshot, WorldSnapshot};
use super::types::Inventory;
use crate::geometry::BlockPos;

/// One scripted reply: the outcome plus items the world gains from it.
#[derive(Debug, Clone)]
struct Reply {
    outcome: ActionOutcome,
    gained: Vec<(String, u32)>,
}

/// Gateway whose replies are queued per tool name. Unscripted tools succeed.
#[derive(Debug, Default)]
pub(crate) struct MockGateway {
    pub world: RefCell<WorldSnapshot>,
    pub threat: RefCell<ThreatSnapshot>,
    replies: RefCell<BTreeMap<String, VecDeque<Reply>>>,
    blocks: RefCell<BTreeMap<String, VecDeque<Option<BlockPos>>>>,
    caves: RefCell<Vec<Cavity>>,
    calls: RefCell<Vec<Operation>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inventory(pairs: &[(&str, u32)]) -> Self {
        let gateway = Self::new();
        gateway.world.borrow_mut().inventory = Inventory::from_pairs(pairs.iter().copied());
        gateway
    }

    pub fn reply(&self, tool: &str, success: bool, message: &str) {
        self.reply_gaining(tool, success, message, &[]);
    }

    pub fn reply_gaining(&self, tool: &str, success: bool, message: &str, gained: &[(&str, u32)]) {
        let outcome = if success {
            ActionOutcome::ok(message)
        } else {
            ActionOutcome::failed(message)
        };
        self.replies
            .borrow_mut()
            .entry(tool.to_string())
            .or_default()
            .push_back(Reply {
                outcome,
                gained: gained
                    .iter()
                    .map(|(item, count)| ((*item).to_string(), *count))
                    .collect(),
            });
    }

    /// Queues the next `find_block` answer for `block`. The last answer repeats.
    pub fn locate(&self, block: &str, position: Option<BlockPos>) {
        self.blocks
            .borrow_mut()
            .entry(block.to_string())
            .or_default()
            .push_back(position);
    }

    pub fn set_caves(&self, caves: Vec<Cavity>) {
        *self.caves.borrow_mut() = caves;
    }

    pub fn give(&self, item: &str, count: u32) {
        self.world.borrow_mut().inventory.add(item, count);
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.calls.borrow().clone()
    }

    pub fn tools_called(&self) -> Vec<&'static str> {
        self.calls.borrow().iter().map(Operation::name).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ActionGateway for MockGateway {
    fn execute(&self, operation: &Operation) -> ActionOutcome {
        self.calls.borrow_mut().push(operation.clone());
        let reply = self
            .replies
            .borrow_mut()
            .get_mut(operation.name())
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => {
                let mut world = self.world.borrow_mut();
                for (item, count) in &reply.gained {
                    world.inventory.add(item, *count);
                }
                reply.outcome
            }
            None => ActionOutcome::ok(format!("{} done", operation.name())),
        }
    }

    fn world_snapshot(&self) -> Result<WorldSnapshot, GatewayError> {
        Ok(self.world.borrow().clone())
    }

    fn threat_assessment(&self) -> Result<ThreatSnapshot, GatewayError> {
        Ok(self.threat.borrow().clone())
    }

    fn inventory(&self) -> Result<Inventory, GatewayError> {
        Ok(self.world.borrow().inventory.clone())
    }

    fn find_block(
        &self,
        block: &str,
        _max_distance: u32,
    ) -> Result<Option<BlockPos>, GatewayError> {
        let mut blocks = self.blocks.borrow_mut();
        let Some(queue) = blocks.get_mut(block) else {
            return Ok(None);
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().flatten())
        } else {
            Ok(queue.front().copied().flatten())
        }
    }

    fn scan_caves(&self, _radius: u32) -> Result<Vec<Cavity>, GatewayError> {
        Ok(self.caves.borrow().clone())
    }

    fn abort(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Clock that only moves when told to. `sleep` advances it.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Cell<Instant>,
    unix: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::now()),
            unix: Cell::new(1_700_000_000),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.unix.set(self.unix.get() + duration.as_secs());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn unix_time(&self) -> u64 {
        self.unix.get()
    }
}
