//! Engine tunables and service endpoints, loaded from `config.toml` or the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::error::ConfigError;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "config.toml";

pub const ENV_BOT_API_URL: &str = "CRAFT_AGENT_BOT_API_URL";
pub const ENV_QUERY_TIMEOUT_MS: &str = "CRAFT_AGENT_QUERY_TIMEOUT_MS";
pub const ENV_ACTION_TIMEOUT_MS: &str = "CRAFT_AGENT_ACTION_TIMEOUT_MS";
pub const ENV_PLANNER_URL: &str = "CRAFT_AGENT_PLANNER_URL";
pub const ENV_PLANNER_TIMEOUT_MS: &str = "CRAFT_AGENT_PLANNER_TIMEOUT_MS";
pub const ENV_RETRY_CEILING: &str = "CRAFT_AGENT_RETRY_CEILING";
pub const ENV_PICKUP_WAIT_MS: &str = "CRAFT_AGENT_PICKUP_WAIT_MS";
pub const ENV_PICKUP_POLLS: &str = "CRAFT_AGENT_PICKUP_POLLS";
pub const ENV_SHELTER_COOLDOWN_SECS: &str = "CRAFT_AGENT_SHELTER_COOLDOWN_SECS";
pub const ENV_DEPOSIT_COOLDOWN_SECS: &str = "CRAFT_AGENT_DEPOSIT_COOLDOWN_SECS";
pub const ENV_COLLECT_COOLDOWN_SECS: &str = "CRAFT_AGENT_COLLECT_COOLDOWN_SECS";
pub const ENV_CRITICAL_HEALTH: &str = "CRAFT_AGENT_CRITICAL_HEALTH";
pub const ENV_HUNGER_THRESHOLD: &str = "CRAFT_AGENT_HUNGER_THRESHOLD";
pub const ENV_OXYGEN_THRESHOLD: &str = "CRAFT_AGENT_OXYGEN_THRESHOLD";
pub const ENV_SUDDEN_DAMAGE: &str = "CRAFT_AGENT_SUDDEN_DAMAGE";
pub const ENV_RECENT_HIT_SECS: &str = "CRAFT_AGENT_RECENT_HIT_SECS";
pub const ENV_MELEE_RANGE: &str = "CRAFT_AGENT_MELEE_RANGE";
pub const ENV_LETHAL_RADIUS: &str = "CRAFT_AGENT_LETHAL_RADIUS";
pub const ENV_FULL_INVENTORY_FREE_SLOTS: &str = "CRAFT_AGENT_FULL_INVENTORY_FREE_SLOTS";
pub const ENV_LOCATION_CAPACITY: &str = "CRAFT_AGENT_LOCATION_CAPACITY";
pub const ENV_DEDUP_RADIUS: &str = "CRAFT_AGENT_DEDUP_RADIUS";
pub const ENV_MAX_SCOUT_DISTANCE: &str = "CRAFT_AGENT_MAX_SCOUT_DISTANCE";
pub const ENV_PERSISTENT_ATTEMPTS: &str = "CRAFT_AGENT_PERSISTENT_ATTEMPTS";
pub const ENV_CHAIN_TIMEOUT_FLOOR_SECS: &str = "CRAFT_AGENT_CHAIN_TIMEOUT_FLOOR_SECS";
pub const ENV_CHAIN_TIMEOUT_CEILING_SECS: &str = "CRAFT_AGENT_CHAIN_TIMEOUT_CEILING_SECS";
pub const ENV_MAX_INJECTIONS: &str = "CRAFT_AGENT_MAX_INJECTIONS";
pub const ENV_INVENTORY_SNAPSHOT_SIZE: &str = "CRAFT_AGENT_INVENTORY_SNAPSHOT_SIZE";

pub const DEFAULT_BOT_API_URL: &str = "http://localhost:3001";
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PLANNER_TIMEOUT_MS: u64 = 120_000;

/// Tunables for the instinct, chain, and search layers.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Consecutive failures a step may accumulate before its chain is cancelled.
    pub retry_ceiling: u32,
    /// Delay between inventory polls while waiting for mined items to be picked up.
    pub pickup_wait: Duration,
    pub pickup_polls: u32,
    pub shelter_cooldown: Duration,
    pub deposit_cooldown: Duration,
    pub collect_cooldown: Duration,
    /// Health strictly below this is critical.
    pub critical_health: f32,
    /// Food strictly below this triggers eating.
    pub hunger_threshold: f32,
    /// Oxygen at or below this triggers escape.
    pub oxygen_threshold: f32,
    /// Health lost between two ticks that counts as a sudden hit.
    pub sudden_damage: f32,
    pub recent_hit_window: Duration,
    pub melee_range: f32,
    pub lethal_radius: f32,
    /// Inventory counts as full when at most this many slots are free.
    pub full_inventory_free_slots: u32,
    pub location_capacity: usize,
    pub dedup_radius: f64,
    pub max_scout_distance: f64,
    pub persistent_attempts: u32,
    pub chain_timeout_floor: Duration,
    pub chain_timeout_ceiling: Duration,
    pub max_injections: u32,
    pub inventory_snapshot_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            pickup_wait: Duration::from_millis(500),
            pickup_polls: 3,
            shelter_cooldown: Duration::from_secs(60),
            deposit_cooldown: Duration::from_secs(120),
            collect_cooldown: Duration::from_secs(30),
            critical_health: 5.0,
            hunger_threshold: 5.0,
            oxygen_threshold: 6.0,
            sudden_damage: 6.0,
            recent_hit_window: Duration::from_secs(3),
            melee_range: 3.5,
            lethal_radius: 5.0,
            full_inventory_free_slots: 2,
            location_capacity: 5,
            dedup_radius: 16.0,
            max_scout_distance: 128.0,
            persistent_attempts: 6,
            chain_timeout_floor: Duration::from_secs(120),
            chain_timeout_ceiling: Duration::from_secs(1200),
            max_injections: 8,
            inventory_snapshot_size: 15,
        }
    }
}

impl EngineConfig {
    fn from_env_with<F>(getter: &mut F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            retry_ceiling: parse_positive(getter, ENV_RETRY_CEILING, defaults.retry_ceiling)?,
            pickup_wait: millis_or(getter, ENV_PICKUP_WAIT_MS, defaults.pickup_wait)?,
            pickup_polls: parse_or(getter, ENV_PICKUP_POLLS, defaults.pickup_polls)?,
            shelter_cooldown: secs_or(getter, ENV_SHELTER_COOLDOWN_SECS, defaults.shelter_cooldown)?,
            deposit_cooldown: secs_or(getter, ENV_DEPOSIT_COOLDOWN_SECS, defaults.deposit_cooldown)?,
            collect_cooldown: secs_or(getter, ENV_COLLECT_COOLDOWN_SECS, defaults.collect_cooldown)?,
            critical_health: parse_or(getter, ENV_CRITICAL_HEALTH, defaults.critical_health)?,
            hunger_threshold: parse_or(getter, ENV_HUNGER_THRESHOLD, defaults.hunger_threshold)?,
            oxygen_threshold: parse_or(getter, ENV_OXYGEN_THRESHOLD, defaults.oxygen_threshold)?,
            sudden_damage: parse_positive(getter, ENV_SUDDEN_DAMAGE, defaults.sudden_damage)?,
            recent_hit_window: secs_or(getter, ENV_RECENT_HIT_SECS, defaults.recent_hit_window)?,
            melee_range: parse_positive(getter, ENV_MELEE_RANGE, defaults.melee_range)?,
            lethal_radius: parse_positive(getter, ENV_LETHAL_RADIUS, defaults.lethal_radius)?,
            full_inventory_free_slots: parse_or(
                getter,
                ENV_FULL_INVENTORY_FREE_SLOTS,
                defaults.full_inventory_free_slots,
            )?,
            location_capacity: parse_positive(
                getter,
                ENV_LOCATION_CAPACITY,
                defaults.location_capacity,
            )?,
            dedup_radius: parse_positive(getter, ENV_DEDUP_RADIUS, defaults.dedup_radius)?,
            max_scout_distance: parse_positive(
                getter,
                ENV_MAX_SCOUT_DISTANCE,
                defaults.max_scout_distance,
            )?,
            persistent_attempts: parse_or(
                getter,
                ENV_PERSISTENT_ATTEMPTS,
                defaults.persistent_attempts,
            )?,
            chain_timeout_floor: secs_or(
                getter,
                ENV_CHAIN_TIMEOUT_FLOOR_SECS,
                defaults.chain_timeout_floor,
            )?,
            chain_timeout_ceiling: secs_or(
                getter,
                ENV_CHAIN_TIMEOUT_CEILING_SECS,
                defaults.chain_timeout_ceiling,
            )?,
            max_injections: parse_or(getter, ENV_MAX_INJECTIONS, defaults.max_injections)?,
            inventory_snapshot_size: parse_positive(
                getter,
                ENV_INVENTORY_SNAPSHOT_SIZE,
                defaults.inventory_snapshot_size,
            )?,
        };

        if config.chain_timeout_floor > config.chain_timeout_ceiling {
            return Err(ConfigError::InvalidValue {
                key: ENV_CHAIN_TIMEOUT_FLOOR_SECS,
                value: format!(
                    "{} exceeds ceiling {}",
                    config.chain_timeout_floor.as_secs(),
                    config.chain_timeout_ceiling.as_secs()
                ),
            });
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Timeout for read-only queries; actions size their own timeouts.
    pub query_timeout_ms: u64,
    /// Fixed budget for every action. Unset means each action sizes its own.
    pub action_timeout_ms: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BOT_API_URL.to_string(),
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            action_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPlannerConfig {
    pub url: String,
    pub timeout_ms: u64,
}

/// Everything the control process needs to wire up an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub gateway: GatewayConfig,
    pub engine: EngineConfig,
    pub planner: Option<HttpPlannerConfig>,
}

impl AgentConfig {
    pub fn from_default_sources() -> Result<Self, ConfigError> {
        let config_path = Path::new(DEFAULT_CONFIG_FILE_NAME);
        if config_path.exists() {
            return Self::from_config_file(config_path);
        }
        Self::from_env()
    }

    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::ReadConfigFile {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let value: toml::Value =
            toml::from_str(&content).map_err(|err| ConfigError::ParseConfigFile {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        let table = value
            .as_table()
            .ok_or_else(|| ConfigError::ParseConfigFile {
                path: path.display().to_string(),
                message: "root is not a TOML table".to_string(),
            })?;

        Self::from_env_with(|key| {
            table
                .get(key)
                .and_then(toml_value_to_string)
                .or_else(|| std::env::var(key).ok())
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_env_with<F>(mut getter: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base_url = match getter(ENV_BOT_API_URL) {
            Some(_) => required_env(&mut getter, ENV_BOT_API_URL)?,
            None => DEFAULT_BOT_API_URL.to_string(),
        };
        let gateway = GatewayConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            query_timeout_ms: parse_positive(
                &mut getter,
                ENV_QUERY_TIMEOUT_MS,
                DEFAULT_QUERY_TIMEOUT_MS,
            )?,
            action_timeout_ms: match getter(ENV_ACTION_TIMEOUT_MS) {
                Some(_) => Some(parse_positive(&mut getter, ENV_ACTION_TIMEOUT_MS, 1)?),
                None => None,
            },
        };

        let planner = match getter(ENV_PLANNER_URL).filter(|value| !value.trim().is_empty()) {
            Some(url) => Some(HttpPlannerConfig {
                url,
                timeout_ms: parse_positive(
                    &mut getter,
                    ENV_PLANNER_TIMEOUT_MS,
                    DEFAULT_PLANNER_TIMEOUT_MS,
                )?,
            }),
            None => None,
        };

        let engine = EngineConfig::from_env_with(&mut getter)?;
        Ok(Self {
            gateway,
            engine,
            planner,
        })
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            engine: EngineConfig::default(),
            planner: None,
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn toml_value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        toml::Value::Float(value) => Some(value.to_string()),
        toml::Value::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

fn required_env<F>(getter: &mut F, key: &'static str) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let value = getter(key).ok_or(ConfigError::MissingEnv { key })?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyEnv { key });
    }
    Ok(value)
}

fn parse_or<F, T>(getter: &mut F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
    T: FromStr,
{
    match getter(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

fn parse_positive<F, T>(getter: &mut F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    match getter(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .ok()
            .filter(|parsed| *parsed > T::default())
            .ok_or(ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

fn secs_or<F>(getter: &mut F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    parse_or(getter, key, default.as_secs()).map(Duration::from_secs)
}

fn millis_or<F>(getter: &mut F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    parse_or(getter, key, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn getter_from(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = AgentConfig::from_env_with(getter_from(&[])).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.engine.retry_ceiling, 3);
        assert_eq!(config.engine.pickup_wait, Duration::from_millis(500));
        assert!(config.planner.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AgentConfig::from_env_with(getter_from(&[
            (ENV_BOT_API_URL, "http://bot:4000/"),
            (ENV_PLANNER_URL, "http://planner/decide"),
            (ENV_RETRY_CEILING, "5"),
            (ENV_PICKUP_POLLS, "0"),
            (ENV_MELEE_RANGE, "4.5"),
            (ENV_ACTION_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.gateway.base_url, "http://bot:4000");
        assert_eq!(config.gateway.action_timeout_ms, Some(250));
        assert_eq!(
            config.planner,
            Some(HttpPlannerConfig {
                url: "http://planner/decide".to_string(),
                timeout_ms: DEFAULT_PLANNER_TIMEOUT_MS,
            })
        );
        assert_eq!(config.engine.retry_ceiling, 5);
        assert_eq!(config.engine.pickup_polls, 0);
        assert_eq!(config.engine.melee_range, 4.5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = AgentConfig::from_env_with(getter_from(&[(ENV_RETRY_CEILING, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_RETRY_CEILING,
                value: "0".to_string(),
            }
        );

        let err = AgentConfig::from_env_with(getter_from(&[(ENV_BOT_API_URL, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::EmptyEnv { key: ENV_BOT_API_URL });

        let err = AgentConfig::from_env_with(getter_from(&[
            (ENV_CHAIN_TIMEOUT_FLOOR_SECS, "900"),
            (ENV_CHAIN_TIMEOUT_CEILING_SECS, "300"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_CHAIN_TIMEOUT_FLOOR_SECS));
    }

    #[test]
    fn config_file_values_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "CRAFT_AGENT_BOT_API_URL = \"http://file:3001\"\nCRAFT_AGENT_PERSISTENT_ATTEMPTS = 9\n",
        )
        .unwrap();
        let config = AgentConfig::from_config_file(&path).unwrap();
        assert_eq!(config.gateway.base_url, "http://file:3001");
        assert_eq!(config.engine.persistent_attempts, 9);
    }
}
