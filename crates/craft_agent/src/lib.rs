pub mod engine;
pub mod geometry;
pub mod logging;

pub use engine::{
    ActionGateway, AgentConfig, AgentController, ChainExecutor, ChainLibrary, ControlLayer,
    ControlTick, EngineConfig, EscalationReport, ExperienceMemory, ExperienceStore,
    HttpActionGateway, HttpPlanner, Operation, Planner, PlannerDirective, QueuePlanner,
    SystemClock, TickOutcome, TickResult,
};
pub use geometry::BlockPos;
