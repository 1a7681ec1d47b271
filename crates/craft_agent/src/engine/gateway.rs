//! Action Gateway: the only path from the engine to the world-action service.
//!
//! Actions never fail with a Rust error. Every transport or remote problem is
//! folded into an [`ActionOutcome`] with `success == false`, so the chain and
//! instinct layers deal with a single failure shape. Read-only queries return
//! `Result` and callers choose their own fallback.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::config::GatewayConfig;
use super::error::GatewayError;
use super::operation::{Endpoint, HttpMethod, Operation};
use super::snapshot::{
    CombatStatus, Environment, NearbyEntity, Recommendation, ThreatDetail, ThreatSnapshot,
    TimePhase, WorldSnapshot,
};
use super::types::{Inventory, InventorySlot, INVENTORY_SLOTS, MAX_FOOD, MAX_HEALTH, MAX_OXYGEN};
use crate::geometry::BlockPos;

/// Normalised result of one remote action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    /// Operation-specific fields returned alongside `success` and `message`.
    #[serde(default)]
    pub data: Value,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Value::Null,
        }
    }
}

/// An open underground space reported by a structure scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cavity {
    pub position: BlockPos,
    pub size: u32,
}

pub trait ActionGateway {
    fn execute(&self, operation: &Operation) -> ActionOutcome;

    fn world_snapshot(&self) -> Result<WorldSnapshot, GatewayError>;

    fn threat_assessment(&self) -> Result<ThreatSnapshot, GatewayError>;

    fn inventory(&self) -> Result<Inventory, GatewayError>;

    /// Nearest matching block within `max_distance`, if any.
    fn find_block(&self, block: &str, max_distance: u32)
        -> Result<Option<BlockPos>, GatewayError>;

    fn scan_caves(&self, radius: u32) -> Result<Vec<Cavity>, GatewayError>;

    /// Cancels whatever long-running action the remote side is executing.
    fn abort(&self) -> Result<(), GatewayError>;

    fn position(&self) -> Result<BlockPos, GatewayError> {
        Ok(self.world_snapshot()?.position)
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpActionGateway {
    base_url: String,
    query_timeout: Duration,
    action_timeout: Option<Duration>,
    client: Client,
}

impl HttpActionGateway {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .build()
            .map_err(|err| GatewayError::BuildClient {
                message: err.to_string(),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            query_timeout: Duration::from_millis(config.query_timeout_ms.max(1)),
            action_timeout: config.action_timeout_ms.map(|ms| Duration::from_millis(ms.max(1))),
            client,
        })
    }

    fn send(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint.path);
        let request = match endpoint.method {
            HttpMethod::Get => self.client.get(url).query(&query_pairs(&endpoint.body)),
            HttpMethod::Post => self.client.post(url).json(&endpoint.body),
        };

        let response = request.timeout(timeout).send().map_err(|err| {
            if err.is_timeout() {
                GatewayError::Timeout {
                    path: endpoint.path.to_string(),
                }
            } else {
                GatewayError::Http {
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
            return Err(GatewayError::HttpStatus {
                code: status.as_u16(),
                message,
            });
        }

        response.json().map_err(|err| GatewayError::DecodeResponse {
            message: err.to_string(),
        })
    }

    fn query<T: DeserializeOwned>(&self, path: &'static str, params: Value) -> Result<T, GatewayError> {
        let endpoint = Endpoint {
            method: HttpMethod::Get,
            path,
            body: params,
        };
        let value = self.send(&endpoint, self.query_timeout)?;
        serde_json::from_value(value).map_err(|err| GatewayError::DecodeResponse {
            message: err.to_string(),
        })
    }
}

impl ActionGateway for HttpActionGateway {
    fn execute(&self, operation: &Operation) -> ActionOutcome {
        let endpoint = operation.endpoint();
        let timeout = self
            .action_timeout
            .unwrap_or_else(|| operation.estimated_timeout());
        debug!(operation = %operation, timeout_ms = timeout.as_millis() as u64, "calling action service");

        match self.send(&endpoint, timeout) {
            Ok(value) => outcome_from_value(value),
            Err(GatewayError::Timeout { path }) => {
                warn!(operation = operation.name(), path = %path, "action timed out, aborting remote side");
                if let Err(err) = self.abort() {
                    warn!(error = %err, "abort request failed");
                }
                ActionOutcome::failed(format!(
                    "{} timed out after {}ms",
                    operation.name(),
                    timeout.as_millis()
                ))
            }
            Err(err) => ActionOutcome::failed(format!("API error: {err}")),
        }
    }

    fn world_snapshot(&self) -> Result<WorldSnapshot, GatewayError> {
        let state: StatePayload = self.query("/state", Value::Null)?;
        let combat = match self.query::<CombatPayload>("/combat_status", Value::Null) {
            Ok(combat) => combat.into(),
            Err(err) => {
                debug!(error = %err, "combat status unavailable");
                CombatStatus::default()
            }
        };
        Ok(state.into_snapshot(combat))
    }

    fn threat_assessment(&self) -> Result<ThreatSnapshot, GatewayError> {
        let payload: ThreatPayload = self.query("/threat_assessment", Value::Null)?;
        Ok(payload.into())
    }

    fn inventory(&self) -> Result<Inventory, GatewayError> {
        let payload: InventoryPayload = self.query("/inventory", Value::Null)?;
        Ok(Inventory::from_slots(&payload.items))
    }

    fn find_block(
        &self,
        block: &str,
        max_distance: u32,
    ) -> Result<Option<BlockPos>, GatewayError> {
        let endpoint = Operation::find(block, max_distance).endpoint();
        let payload: FindBlockPayload = self.query(endpoint.path, endpoint.body)?;
        Ok(if payload.success { payload.position } else { None })
    }

    fn scan_caves(&self, radius: u32) -> Result<Vec<Cavity>, GatewayError> {
        let payload: CavePayload =
            self.query("/scan_caves", serde_json::json!({ "radius": radius }))?;
        Ok(payload.caves)
    }

    fn abort(&self) -> Result<(), GatewayError> {
        let endpoint = Operation::StopMoving {}.endpoint();
        self.send(&endpoint, self.query_timeout).map(|_| ())
    }
}

fn query_pairs(body: &Value) -> Vec<(String, String)> {
    match body {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn outcome_from_value(value: Value) -> ActionOutcome {
    let Value::Object(mut map) = value else {
        return ActionOutcome::failed(format!("unexpected response: {value}"));
    };
    let success = map
        .remove("success")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
    let message = match map.remove("message") {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let data = if map.is_empty() {
        Value::Null
    } else {
        Value::Object(map)
    };
    ActionOutcome {
        success,
        message,
        data,
    }
}

// ============================================================================
// Wire payloads
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatePayload {
    health: f32,
    food: f32,
    oxygen: f32,
    is_safe_outside: bool,
    can_see_sky: bool,
    environment: Environment,
    time: TimePhase,
    position: BlockPos,
    inventory: Vec<InventorySlot>,
    empty_slots: Option<u32>,
    nearby_entities: Vec<EntityPayload>,
    nearby_blocks: Vec<String>,
    nearby_drops: u32,
}

impl Default for StatePayload {
    fn default() -> Self {
        Self {
            health: MAX_HEALTH,
            food: MAX_FOOD,
            oxygen: MAX_OXYGEN,
            is_safe_outside: true,
            can_see_sky: true,
            environment: Environment::Surface,
            time: TimePhase::Day,
            position: BlockPos::new(0.0, 64.0, 0.0),
            inventory: Vec::new(),
            empty_slots: None,
            nearby_entities: Vec::new(),
            nearby_blocks: Vec::new(),
            nearby_drops: 0,
        }
    }
}

impl StatePayload {
    fn into_snapshot(self, combat: CombatStatus) -> WorldSnapshot {
        let used_slots = self.inventory.len() as u32;
        WorldSnapshot {
            health: self.health,
            food: self.food,
            oxygen: self.oxygen,
            is_safe_outside: self.is_safe_outside,
            can_see_sky: self.can_see_sky,
            environment: self.environment,
            time_phase: self.time,
            position: self.position,
            inventory: Inventory::from_slots(&self.inventory),
            empty_slots: self
                .empty_slots
                .unwrap_or_else(|| INVENTORY_SLOTS.saturating_sub(used_slots)),
            nearby_entities: self
                .nearby_entities
                .into_iter()
                .map(|entity| NearbyEntity {
                    kind: entity.kind,
                    distance: entity.distance,
                })
                .collect(),
            nearby_blocks: self.nearby_blocks,
            nearby_drops: self.nearby_drops,
            combat,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntityPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    distance: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CombatPayload {
    under_attack: bool,
    last_attacker: Option<String>,
    seconds_since_hit: Option<f32>,
}

impl From<CombatPayload> for CombatStatus {
    fn from(payload: CombatPayload) -> Self {
        CombatStatus {
            under_attack: payload.under_attack,
            last_attacker: payload.last_attacker,
            seconds_since_hit: payload.seconds_since_hit,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ThreatPayload {
    recommendation: Recommendation,
    reason: String,
    threats: ThreatListPayload,
    is_night: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThreatListPayload {
    details: Vec<ThreatDetail>,
}

impl From<ThreatPayload> for ThreatSnapshot {
    fn from(payload: ThreatPayload) -> Self {
        ThreatSnapshot {
            recommendation: payload.recommendation,
            reason: payload.reason,
            threats: payload.threats.details,
            is_night: payload.is_night,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InventoryPayload {
    items: Vec<InventorySlot>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FindBlockPayload {
    success: bool,
    position: Option<BlockPos>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CavePayload {
    caves: Vec<Cavity>,
}
