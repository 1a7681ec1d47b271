//! Closed set of world actions the engine can request, and their remote endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        }
    }

    /// Cardinal direction for the n-th attempt, cycling clockwise from north.
    pub fn nth(index: usize) -> Direction {
        Self::ALL[index % Self::ALL.len()]
    }
}

fn one() -> u32 {
    1
}

fn default_find_distance() -> u32 {
    64
}

fn default_equip_destination() -> String {
    "hand".to_string()
}

/// A single request to the world-action service.
///
/// Serialized as `{"tool": "<name>", "args": {...}}`, the shape chain
/// definitions and learned solutions use on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum Operation {
    MineBlock {
        block_type: String,
        #[serde(default = "one")]
        count: u32,
    },
    CraftItem {
        item_name: String,
        #[serde(default = "one")]
        count: u32,
    },
    SmeltItem {
        item_name: String,
        #[serde(default = "one")]
        count: u32,
    },
    PlaceBlock {
        block_name: String,
    },
    EquipItem {
        item_name: String,
        #[serde(default = "default_equip_destination")]
        destination: String,
    },
    EatFood {},
    AttackEntity {
        #[serde(default)]
        entity_type: String,
    },
    DigShelter {},
    EscapeWater {},
    Flee {},
    ShieldBlock {},
    DigDown {
        #[serde(default)]
        depth: Option<u32>,
        #[serde(default)]
        target_y: Option<i32>,
    },
    DigTunnel {
        direction: Direction,
        length: u32,
    },
    BuildShelter {},
    Explore {
        distance: u32,
    },
    MoveTo {
        x: f64,
        y: f64,
        z: f64,
    },
    FindBlock {
        block_type: String,
        #[serde(default = "default_find_distance")]
        max_distance: u32,
    },
    SleepInBed {},
    SendChat {
        message: String,
    },
    StopMoving {},
    StoreItems {},
    CollectDrops {},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Remote route for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: &'static str,
    pub body: Value,
}

impl Operation {
    pub fn mine(block_type: impl Into<String>, count: u32) -> Self {
        Operation::MineBlock {
            block_type: block_type.into(),
            count,
        }
    }

    pub fn craft(item_name: impl Into<String>) -> Self {
        Operation::CraftItem {
            item_name: item_name.into(),
            count: 1,
        }
    }

    pub fn place(block_name: impl Into<String>) -> Self {
        Operation::PlaceBlock {
            block_name: block_name.into(),
        }
    }

    pub fn equip(item_name: impl Into<String>, destination: impl Into<String>) -> Self {
        Operation::EquipItem {
            item_name: item_name.into(),
            destination: destination.into(),
        }
    }

    pub fn attack(entity_type: impl Into<String>) -> Self {
        Operation::AttackEntity {
            entity_type: entity_type.into(),
        }
    }

    pub fn find(block_type: impl Into<String>, max_distance: u32) -> Self {
        Operation::FindBlock {
            block_type: block_type.into(),
            max_distance,
        }
    }

    pub fn move_to(x: f64, y: f64, z: f64) -> Self {
        Operation::MoveTo { x, y, z }
    }

    /// Tool name used on the wire and in error-solution keys.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::MineBlock { .. } => "mine_block",
            Operation::CraftItem { .. } => "craft_item",
            Operation::SmeltItem { .. } => "smelt_item",
            Operation::PlaceBlock { .. } => "place_block",
            Operation::EquipItem { .. } => "equip_item",
            Operation::EatFood {} => "eat_food",
            Operation::AttackEntity { .. } => "attack_entity",
            Operation::DigShelter {} => "dig_shelter",
            Operation::EscapeWater {} => "escape_water",
            Operation::Flee {} => "flee",
            Operation::ShieldBlock {} => "shield_block",
            Operation::DigDown { .. } => "dig_down",
            Operation::DigTunnel { .. } => "dig_tunnel",
            Operation::BuildShelter {} => "build_shelter",
            Operation::Explore { .. } => "explore",
            Operation::MoveTo { .. } => "move_to",
            Operation::FindBlock { .. } => "find_block",
            Operation::SleepInBed {} => "sleep_in_bed",
            Operation::SendChat { .. } => "send_chat",
            Operation::StopMoving {} => "stop_moving",
            Operation::StoreItems {} => "store_items",
            Operation::CollectDrops {} => "collect_drops",
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        let (method, path, body) = match self {
            Operation::MineBlock { block_type, count } => (
                HttpMethod::Post,
                "/action/mine",
                json!({ "block_type": block_type, "count": count }),
            ),
            Operation::CraftItem { item_name, count } => (
                HttpMethod::Post,
                "/action/craft",
                json!({ "item_name": item_name, "count": count }),
            ),
            Operation::SmeltItem { item_name, count } => (
                HttpMethod::Post,
                "/action/smelt",
                json!({ "item_name": item_name, "count": count }),
            ),
            Operation::PlaceBlock { block_name } => (
                HttpMethod::Post,
                "/action/place",
                json!({ "block_name": block_name }),
            ),
            Operation::EquipItem {
                item_name,
                destination,
            } => (
                HttpMethod::Post,
                "/action/equip",
                json!({ "item_name": item_name, "destination": destination }),
            ),
            Operation::EatFood {} => (HttpMethod::Post, "/action/eat", json!({})),
            Operation::AttackEntity { entity_type } => (
                HttpMethod::Post,
                "/action/attack",
                json!({ "entity_type": entity_type }),
            ),
            Operation::DigShelter {} => (HttpMethod::Post, "/action/dig_shelter", json!({})),
            Operation::EscapeWater {} => (HttpMethod::Post, "/action/escape_water", json!({})),
            Operation::Flee {} => (HttpMethod::Post, "/action/flee", json!({})),
            Operation::ShieldBlock {} => (HttpMethod::Post, "/action/shield_block", json!({})),
            Operation::DigDown { depth, target_y } => (
                HttpMethod::Post,
                "/action/dig_down",
                json!({ "depth": depth.unwrap_or(10), "target_y": target_y.unwrap_or(0) }),
            ),
            Operation::DigTunnel { direction, length } => (
                HttpMethod::Post,
                "/action/dig_tunnel",
                json!({ "direction": direction.as_str(), "length": length }),
            ),
            Operation::BuildShelter {} => {
                (HttpMethod::Post, "/action/build_shelter", json!({}))
            }
            Operation::Explore { distance } => (
                HttpMethod::Post,
                "/action/explore",
                json!({ "distance": distance }),
            ),
            Operation::MoveTo { x, y, z } => (
                HttpMethod::Post,
                "/action/move",
                json!({ "x": x, "y": y, "z": z }),
            ),
            Operation::FindBlock {
                block_type,
                max_distance,
            } => (
                HttpMethod::Get,
                "/find_block",
                json!({ "type": block_type, "range": max_distance }),
            ),
            Operation::SleepInBed {} => (HttpMethod::Post, "/action/sleep", json!({})),
            Operation::SendChat { message } => {
                let message: String = message.chars().take(256).collect();
                (
                    HttpMethod::Post,
                    "/action/chat",
                    json!({ "message": message }),
                )
            }
            Operation::StopMoving {} => (HttpMethod::Post, "/action/stop", json!({})),
            Operation::StoreItems {} => (HttpMethod::Post, "/action/store_items", json!({})),
            Operation::CollectDrops {} => {
                (HttpMethod::Post, "/action/collect_drops", json!({}))
            }
        };
        Endpoint { method, path, body }
    }

    /// Remote call budget sized to the real-world duration of the action.
    pub fn estimated_timeout(&self) -> Duration {
        let secs = match self {
            Operation::MineBlock { count, .. } => (u64::from(*count) * 8).max(60),
            Operation::SmeltItem { count, .. } => (u64::from(*count) * 12 + 20).max(60),
            Operation::DigDown { .. }
            | Operation::DigTunnel { .. }
            | Operation::DigShelter {}
            | Operation::BuildShelter {} => 120,
            Operation::MoveTo { .. } => 130,
            Operation::Explore { .. } | Operation::Flee {} | Operation::EscapeWater {} => 60,
            Operation::AttackEntity { .. } | Operation::CollectDrops {} => 30,
            Operation::CraftItem { .. }
            | Operation::PlaceBlock { .. }
            | Operation::EatFood {}
            | Operation::SleepInBed {}
            | Operation::StoreItems {} => 15,
            Operation::EquipItem { .. }
            | Operation::ShieldBlock {}
            | Operation::FindBlock { .. }
            | Operation::SendChat { .. }
            | Operation::StopMoving {} => 10,
        };
        Duration::from_secs(secs)
    }

    /// Block targeted by a mining operation.
    pub fn mined_block(&self) -> Option<&str> {
        match self {
            Operation::MineBlock { block_type, .. } => Some(block_type.as_str()),
            _ => None,
        }
    }

    pub fn requested_count(&self) -> Option<u32> {
        match self {
            Operation::MineBlock { count, .. }
            | Operation::CraftItem { count, .. }
            | Operation::SmeltItem { count, .. } => Some(*count),
            _ => None,
        }
    }

    /// Same operation with its count replaced; operations without a count are returned unchanged.
    pub fn with_count(&self, new_count: u32) -> Operation {
        let mut op = self.clone();
        match &mut op {
            Operation::MineBlock { count, .. }
            | Operation::CraftItem { count, .. }
            | Operation::SmeltItem { count, .. } => *count = new_count.max(1),
            _ => {}
        }
        op
    }

    pub fn is_excavation(&self) -> bool {
        matches!(
            self,
            Operation::DigDown { .. }
                | Operation::DigTunnel { .. }
                | Operation::DigShelter {}
                | Operation::BuildShelter {}
        )
    }

    pub fn is_movement(&self) -> bool {
        matches!(self, Operation::MoveTo { .. } | Operation::Explore { .. })
    }

    fn args_value(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|value| value.get("args").cloned())
            .unwrap_or(Value::Null)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.args_value() {
            Value::Object(map) if !map.is_empty() => {
                let args: Vec<String> = map
                    .iter()
                    .filter(|(_, value)| !value.is_null())
                    .map(|(key, value)| match value {
                        Value::String(text) => format!("{key}={text}"),
                        other => format!("{key}={other}"),
                    })
                    .collect();
                write!(f, "{}({})", self.name(), args.join(", "))
            }
            _ => write!(f, "{}()", self.name()),
        }
    }
}
