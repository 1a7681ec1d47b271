use std::cell::RefCell;

use craft_agent::engine::{
    drop_for_block, ActionGateway, ActionOutcome, AgentController, Cavity, ControlLayer,
    EngineConfig, EscalationReason, GatewayError, Inventory, Operation, QueuePlanner,
    SystemClock, ThreatSnapshot, WorldSnapshot,
};
use craft_agent::BlockPos;

/// A tiny world: mining and crafting add items, escaping water refills air.
#[derive(Default)]
struct ScriptedWorld {
    world: RefCell<WorldSnapshot>,
    calls: RefCell<Vec<Operation>>,
    barren: bool,
}

impl ScriptedWorld {
    fn barren() -> Self {
        Self {
            barren: true,
            ..Self::default()
        }
    }

    fn calls_since(&self, start: usize) -> Vec<Operation> {
        self.calls.borrow()[start..].to_vec()
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ActionGateway for ScriptedWorld {
    fn execute(&self, operation: &Operation) -> ActionOutcome {
        self.calls.borrow_mut().push(operation.clone());
        let mut world = self.world.borrow_mut();
        match operation {
            Operation::MineBlock { block_type, count } => {
                if self.barren {
                    return ActionOutcome::failed(format!("No {block_type} found nearby"));
                }
                world.inventory.add(drop_for_block(block_type), *count);
            }
            Operation::CraftItem { item_name, .. } => {
                let yielded = match item_name.as_str() {
                    "oak_planks" | "stick" => 4,
                    _ => 1,
                };
                world.inventory.add(item_name, yielded);
            }
            Operation::EscapeWater {} => world.oxygen = 20.0,
            _ => {}
        }
        ActionOutcome::ok(format!("{} done", operation.name()))
    }

    fn world_snapshot(&self) -> Result<WorldSnapshot, GatewayError> {
        Ok(self.world.borrow().clone())
    }

    fn threat_assessment(&self) -> Result<ThreatSnapshot, GatewayError> {
        Ok(ThreatSnapshot::safe())
    }

    fn inventory(&self) -> Result<Inventory, GatewayError> {
        Ok(self.world.borrow().inventory.clone())
    }

    fn find_block(&self, _block: &str, _max_distance: u32) -> Result<Option<BlockPos>, GatewayError> {
        Ok(None)
    }

    fn scan_caves(&self, _radius: u32) -> Result<Vec<Cavity>, GatewayError> {
        Ok(Vec::new())
    }

    fn abort(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

fn agent(
    world: ScriptedWorld,
    chains: &[&str],
    config: EngineConfig,
) -> AgentController<ScriptedWorld, SystemClock, QueuePlanner> {
    AgentController::new(
        world,
        SystemClock,
        QueuePlanner::new(chains.iter().copied(), 2),
        config,
    )
}

#[test]
fn queued_chain_runs_to_completion() {
    let mut agent = agent(ScriptedWorld::default(), &["get_wood"], EngineConfig::default());

    let layers: Vec<ControlLayer> = (0..7).map(|_| agent.tick().layer).collect();
    assert_eq!(
        layers,
        vec![
            ControlLayer::Planner,
            ControlLayer::Chain,
            ControlLayer::Chain,
            ControlLayer::Chain,
            ControlLayer::Chain,
            ControlLayer::Chain,
            ControlLayer::Observe,
        ]
    );
    let inventory = agent.gateway().world.borrow().inventory.clone();
    assert_eq!(inventory.count("oak_log"), 6);
    assert_eq!(inventory.count("oak_planks"), 8);
    assert_eq!(inventory.count("stick"), 4);
    assert_eq!(agent.metrics().chains_started, 1);
    assert_eq!(agent.metrics().chains_completed, 1);
    assert_eq!(agent.metrics().total_ticks, 7);
}

#[test]
fn instinct_ticks_never_run_chain_steps() {
    let mut agent = agent(ScriptedWorld::default(), &["get_wood"], EngineConfig::default());
    assert_eq!(agent.tick().layer, ControlLayer::Planner);

    agent.gateway().world.borrow_mut().oxygen = 2.0;
    let before = agent.gateway().call_count();
    let tick = agent.tick();
    assert_eq!(tick.layer, ControlLayer::Instinct);
    assert_eq!(
        agent.gateway().calls_since(before),
        vec![Operation::EscapeWater {}]
    );
    assert_eq!(agent.executor().active().map(|chain| chain.cursor()), Some(0));

    let before = agent.gateway().call_count();
    let tick = agent.tick();
    assert_eq!(tick.layer, ControlLayer::Chain);
    assert_eq!(
        agent.gateway().calls_since(before),
        vec![Operation::mine("oak_log", 6)]
    );
    assert_eq!(agent.executor().active().map(|chain| chain.cursor()), Some(1));
}

#[test]
fn exhausted_search_escalates_then_planner_retries() {
    let config = EngineConfig {
        persistent_attempts: 1,
        ..EngineConfig::default()
    };
    let mut agent = agent(ScriptedWorld::barren(), &["get_wood"], config);
    assert_eq!(agent.tick().layer, ControlLayer::Planner);

    let mut escalated = None;
    for _ in 0..20 {
        let tick = agent.tick();
        assert_eq!(tick.layer, ControlLayer::Chain);
        let result = tick.chain_result().cloned();
        if let Some(report) = result.and_then(|result| result.escalation) {
            escalated = Some(report);
            break;
        }
    }
    let report = escalated.expect("search should escalate");
    assert_eq!(report.reason, EscalationReason::SearchExhausted);
    assert!(!report.detail.attempts.is_empty());
    assert!(!agent.executor().has_active());
    assert!(agent.pending_escalation().is_some());

    let retry = agent.tick();
    assert_eq!(retry.layer, ControlLayer::Planner);
    assert!(agent.pending_escalation().is_none());
    assert_eq!(
        agent.executor().active().map(|chain| chain.name()),
        Some("get_wood")
    );
    assert_eq!(agent.metrics().escalations, 1);
    assert_eq!(agent.metrics().chains_started, 2);
}
