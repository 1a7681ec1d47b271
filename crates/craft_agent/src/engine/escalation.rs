//! Escalation contract: the report handed to the external planner and the
//! directives it may answer with.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::chain::{Chain, Step};
use super::config::HttpPlannerConfig;
use super::context::EngineContext;
use super::error::PlannerError;
use super::operation::Operation;
use super::snapshot::WorldSnapshot;
use super::types::{ChainName, Inventory, ItemName};

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    ChainTimeout,
    RetryCeiling,
    MissingMaterial,
    SearchExhausted,
    MovementBlocked,
    PrerequisiteUnavailable,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::ChainTimeout => "chain_timeout",
            EscalationReason::RetryCeiling => "retry_ceiling",
            EscalationReason::MissingMaterial => "missing_material",
            EscalationReason::SearchExhausted => "search_exhausted",
            EscalationReason::MovementBlocked => "movement_blocked",
            EscalationReason::PrerequisiteUnavailable => "prerequisite_unavailable",
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the chain stood when it gave up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationDetail {
    pub chain: ChainName,
    pub step_index: usize,
    pub step_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retries: u32,
    /// Search actions already tried for this step, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<String>,
    pub elapsed_secs: u64,
    pub limit_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationReport {
    pub reason: EscalationReason,
    /// Human-readable explanation.
    pub message: String,
    pub goal_context: String,
    pub lesson_context: String,
    pub location_context: String,
    pub detail: EscalationDetail,
    pub inventory_summary: BTreeMap<ItemName, u32>,
}

impl EscalationReport {
    /// Report for `chain` with the current step's operation, memory context,
    /// and a bounded inventory snapshot filled in.
    pub fn for_chain(
        ctx: &EngineContext<'_>,
        chain: &Chain,
        reason: EscalationReason,
        message: impl Into<String>,
        inventory: &Inventory,
    ) -> Self {
        let now = ctx.now();
        let step = chain.current_step();
        let target = step.and_then(Step::target).unwrap_or_default();
        let lesson_context = if target.is_empty() {
            String::new()
        } else {
            ctx.experience.lesson_context(target)
        };
        let location_context = ctx
            .position()
            .map(|position| ctx.experience.location_context(position))
            .unwrap_or_default();
        let goal_context = match step {
            Some(step) => format!(
                "chain {} at step {}/{}: {}",
                chain.name(),
                chain.cursor() + 1,
                chain.steps().len(),
                step.operation
            ),
            None => format!("chain {} finished its steps", chain.name()),
        };

        Self {
            reason,
            message: message.into(),
            goal_context,
            lesson_context,
            location_context,
            detail: EscalationDetail {
                chain: chain.name().to_string(),
                step_index: chain.cursor(),
                step_count: chain.steps().len(),
                operation: step.map(|step| step.operation.clone()),
                error: None,
                retries: chain.retry_count(),
                attempts: chain.search().history.clone(),
                elapsed_secs: chain.elapsed(now).as_secs(),
                limit_secs: chain.timeout().as_secs(),
            },
            inventory_summary: inventory.truncated(ctx.config.inventory_snapshot_size),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.detail.error = Some(error.into());
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.detail.operation = Some(operation);
        self
    }

    /// One line for logs and chat.
    pub fn summary(&self) -> String {
        match &self.detail.error {
            Some(error) => format!("[{}] {} ({error})", self.reason, self.message),
            None => format!("[{}] {}", self.reason, self.message),
        }
    }
}

// ============================================================================
// Planner seam
// ============================================================================

/// What the planner wants the engine to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum PlannerDirective {
    StartChain {
        chain: ChainName,
        #[serde(default)]
        items: BTreeMap<ItemName, u32>,
    },
    /// Corrective calls executed in order before the next tick.
    ToolCalls { calls: Vec<Operation> },
    DefineChain {
        name: ChainName,
        #[serde(default)]
        description: String,
        steps: Vec<Step>,
        #[serde(default)]
        start: bool,
    },
    Wait,
}

/// Input for one planner decision.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanRequest<'a> {
    pub escalation: Option<&'a EscalationReport>,
    pub world: &'a WorldSnapshot,
    pub chains: &'a [String],
}

pub trait Planner {
    fn plan(&mut self, request: &PlanRequest<'_>) -> Result<PlannerDirective, PlannerError>;
}

// ============================================================================
// HTTP planner
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpPlanner {
    url: String,
    timeout: Duration,
    client: Client,
}

impl HttpPlanner {
    pub fn from_config(config: &HttpPlannerConfig) -> Result<Self, PlannerError> {
        let client = Client::builder()
            .build()
            .map_err(|err| PlannerError::BuildClient {
                message: err.to_string(),
            })?;
        Ok(Self {
            url: config.url.clone(),
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            client,
        })
    }
}

impl Planner for HttpPlanner {
    fn plan(&mut self, request: &PlanRequest<'_>) -> Result<PlannerDirective, PlannerError> {
        debug!(
            url = %self.url,
            escalated = request.escalation.is_some(),
            "asking planner"
        );
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .map_err(|err| PlannerError::Http {
                message: err.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
            return Err(PlannerError::HttpStatus {
                code: status.as_u16(),
                message,
            });
        }

        response
            .json::<PlannerDirective>()
            .map_err(|err| PlannerError::DecodeResponse {
                message: err.to_string(),
            })
    }
}

// ============================================================================
// Queue planner
// ============================================================================

/// Works through a fixed list of chains, giving each a bounded number of
/// escalated attempts before moving on.
#[derive(Debug, Clone)]
pub struct QueuePlanner {
    queue: VecDeque<ChainName>,
    max_attempts: u32,
    failures: u32,
    started: bool,
}

impl QueuePlanner {
    pub fn new<I, S>(chains: I, max_attempts: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: chains.into_iter().map(Into::into).collect(),
            max_attempts: max_attempts.max(1),
            failures: 0,
            started: false,
        }
    }

    pub fn remaining(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    fn next_chain(&mut self) {
        self.queue.pop_front();
        self.failures = 0;
        self.started = false;
    }
}

impl Planner for QueuePlanner {
    fn plan(&mut self, request: &PlanRequest<'_>) -> Result<PlannerDirective, PlannerError> {
        match request.escalation {
            Some(report) if self.started => {
                self.failures += 1;
                if self.failures >= self.max_attempts {
                    warn!(
                        chain = %report.detail.chain,
                        attempts = self.failures,
                        "giving up on chain"
                    );
                    self.next_chain();
                }
            }
            None if self.started => {
                info!(chain = ?self.queue.front(), "queued chain finished");
                self.next_chain();
            }
            _ => {}
        }

        match self.queue.front() {
            Some(chain) => {
                self.started = true;
                Ok(PlannerDirective::StartChain {
                    chain: chain.clone(),
                    items: BTreeMap::new(),
                })
            }
            None => Ok(PlannerDirective::Wait),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(chain: &str) -> EscalationReport {
        EscalationReport {
            reason: EscalationReason::RetryCeiling,
            message: "step failed 4 times".to_string(),
            goal_context: String::new(),
            lesson_context: String::new(),
            location_context: String::new(),
            detail: EscalationDetail {
                chain: chain.to_string(),
                step_index: 0,
                step_count: 1,
                operation: Some(Operation::craft("stick")),
                error: Some("no planks".to_string()),
                retries: 4,
                attempts: Vec::new(),
                elapsed_secs: 12,
                limit_secs: 120,
            },
            inventory_summary: BTreeMap::new(),
        }
    }

    fn ask(planner: &mut QueuePlanner, escalation: Option<&EscalationReport>) -> PlannerDirective {
        let world = WorldSnapshot::default();
        planner
            .plan(&PlanRequest {
                escalation,
                world: &world,
                chains: &[],
            })
            .unwrap()
    }

    fn start(chain: &str) -> PlannerDirective {
        PlannerDirective::StartChain {
            chain: chain.to_string(),
            items: BTreeMap::new(),
        }
    }

    #[test]
    fn queue_planner_advances_on_completion() {
        let mut planner = QueuePlanner::new(["get_wood", "make_wooden_pickaxe"], 2);
        assert_eq!(ask(&mut planner, None), start("get_wood"));
        assert_eq!(ask(&mut planner, None), start("make_wooden_pickaxe"));
        assert_eq!(ask(&mut planner, None), PlannerDirective::Wait);
    }

    #[test]
    fn queue_planner_retries_then_gives_up() {
        let mut planner = QueuePlanner::new(["make_iron_pickaxe", "get_wood"], 2);
        let failed = report("make_iron_pickaxe");
        assert_eq!(ask(&mut planner, None), start("make_iron_pickaxe"));
        assert_eq!(ask(&mut planner, Some(&failed)), start("make_iron_pickaxe"));
        assert_eq!(ask(&mut planner, Some(&failed)), start("get_wood"));
        assert_eq!(planner.remaining().collect::<Vec<_>>(), vec!["get_wood"]);
    }

    #[test]
    fn report_serializes_camel_case() {
        let value = serde_json::to_value(report("make_torches")).unwrap();
        assert_eq!(value["reason"], json!("retry_ceiling"));
        assert_eq!(value["detail"]["chain"], json!("make_torches"));
        assert_eq!(value["detail"]["operation"]["tool"], json!("craft_item"));
        assert!(value.get("goalContext").is_some());
        assert!(value.get("inventorySummary").is_some());
        assert!(value["detail"].get("attempts").is_none());
    }

    #[test]
    fn directives_parse_from_planner_json() {
        let directive: PlannerDirective = serde_json::from_value(json!({
            "directive": "tool_calls",
            "calls": [
                { "tool": "mine_block", "args": { "block_type": "dirt" } },
                { "tool": "place_block", "args": { "block_name": "crafting_table" } }
            ]
        }))
        .unwrap();
        assert_eq!(
            directive,
            PlannerDirective::ToolCalls {
                calls: vec![Operation::mine("dirt", 1), Operation::place("crafting_table")]
            }
        );

        let directive: PlannerDirective = serde_json::from_value(json!({
            "directive": "start_chain",
            "chain": "get_wood",
            "items": { "oak_planks": 32 }
        }))
        .unwrap();
        assert!(matches!(
            directive,
            PlannerDirective::StartChain { ref items, .. } if items.get("oak_planks") == Some(&32)
        ));

        let directive: PlannerDirective =
            serde_json::from_value(json!({ "directive": "wait" })).unwrap();
        assert_eq!(directive, PlannerDirective::Wait);
    }
}
