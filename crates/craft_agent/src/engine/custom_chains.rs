//! Planner-authored chains: validation, persistence, and lookup alongside the built-ins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::chain::{builtin_templates, ChainTemplate, Step, StepKind};
use super::error::{ChainDefinitionError, PersistError};
use super::operation::Operation;
use super::persist::{read_json_or_default, write_json_to_path};
use super::types::ChainName;

pub const MAX_CUSTOM_STEPS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomChain {
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub failure_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomChainStore {
    #[serde(default)]
    chains: BTreeMap<ChainName, CustomChain>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl CustomChainStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let mut store: Self = read_json_or_default(path)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<&CustomChain> {
        self.chains.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    fn insert(&mut self, name: &str, description: &str, steps: Vec<Step>) -> Result<(), PersistError> {
        let previous = self.chains.get(name);
        let chain = CustomChain {
            description: description.to_string(),
            steps,
            success_count: previous.map(|chain| chain.success_count).unwrap_or(0),
            failure_count: previous.map(|chain| chain.failure_count).unwrap_or(0),
        };
        self.chains.insert(name.to_string(), chain);
        self.save()
    }

    fn record(&mut self, name: &str, success: bool) {
        let Some(chain) = self.chains.get_mut(name) else {
            return;
        };
        if success {
            chain.success_count += 1;
        } else {
            chain.failure_count += 1;
        }
        if let Err(err) = self.save() {
            warn!(chain = name, error = %err, "failed to save custom chains");
        }
    }

    fn save(&self) -> Result<(), PersistError> {
        match &self.path {
            Some(path) => write_json_to_path(self, path),
            None => Ok(()),
        }
    }
}

/// Resolves chain names against the built-ins first, then the custom store.
#[derive(Debug, Clone)]
pub struct ChainLibrary {
    builtins: Vec<ChainTemplate>,
    custom: CustomChainStore,
}

impl Default for ChainLibrary {
    fn default() -> Self {
        Self::new(CustomChainStore::in_memory())
    }
}

impl ChainLibrary {
    pub fn new(custom: CustomChainStore) -> Self {
        Self {
            builtins: builtin_templates(),
            custom,
        }
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|template| template.name == name)
    }

    /// Template for `name` and whether it came from the custom store.
    pub fn template(&self, name: &str) -> Option<(ChainTemplate, bool)> {
        if let Some(template) = self.builtins.iter().find(|template| template.name == name) {
            return Some((template.clone(), false));
        }
        self.custom.get(name).map(|chain| {
            (
                ChainTemplate::new(name, chain.description.clone(), chain.steps.clone()),
                true,
            )
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.builtins
            .iter()
            .map(|template| template.name.clone())
            .chain(self.custom.names().map(str::to_string))
            .collect()
    }

    pub fn custom(&self) -> &CustomChainStore {
        &self.custom
    }

    /// Validates and stores a planner-authored chain.
    pub fn save_chain(
        &mut self,
        name: &str,
        description: &str,
        steps: Vec<Step>,
    ) -> Result<(), ChainDefinitionError> {
        validate_chain(name, &steps, self.is_builtin(name))?;
        let count = steps.len();
        self.custom.insert(name, description, steps)?;
        info!(chain = name, steps = count, "custom chain saved");
        Ok(())
    }

    pub fn record_outcome(&mut self, name: &str, success: bool) {
        self.custom.record(name, success);
    }
}

pub fn validate_chain(name: &str, steps: &[Step], builtin: bool) -> Result<(), ChainDefinitionError> {
    if !is_snake_case(name) {
        return Err(ChainDefinitionError::InvalidName {
            name: name.to_string(),
        });
    }
    if builtin {
        return Err(ChainDefinitionError::BuiltinClash {
            name: name.to_string(),
        });
    }
    if steps.is_empty() || steps.len() > MAX_CUSTOM_STEPS {
        return Err(ChainDefinitionError::StepCount {
            count: steps.len(),
            max: MAX_CUSTOM_STEPS,
        });
    }

    let mut crafts = false;
    let mut gathers = false;
    for (index, step) in steps.iter().enumerate() {
        let is_craft = matches!(step.operation, Operation::CraftItem { .. });
        let is_gather = step.operation.mined_block().is_some()
            || matches!(step.kind, StepKind::Search | StepKind::Gather);
        crafts |= is_craft;
        gathers |= is_gather;

        if step.kind == StepKind::Search {
            if step.search_target.as_deref().map_or(true, str::is_empty) {
                return Err(ChainDefinitionError::MissingSearchTarget { index });
            }
            if step.skip_if.is_empty() {
                return Err(ChainDefinitionError::MissingSkipIf {
                    index,
                    kind: StepKind::Search.as_str().to_string(),
                });
            }
        }
        if is_craft && step.skip_if.is_empty() {
            return Err(ChainDefinitionError::MissingSkipIf {
                index,
                kind: StepKind::Craft.as_str().to_string(),
            });
        }
    }

    if crafts && !gathers {
        return Err(ChainDefinitionError::NoGatherStep);
    }
    Ok(())
}

fn is_snake_case(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_lowercase())
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torch_steps() -> Vec<Step> {
        vec![
            Step::search(Operation::mine("coal_ore", 2), "coal_ore").with_skip_if(&[("coal", 2)]),
            Step::craft(Operation::craft("torch")).with_skip_if(&[("torch", 4)]),
        ]
    }

    #[test]
    fn valid_chain_is_stored_and_resolved() {
        let mut library = ChainLibrary::default();
        library
            .save_chain("make_torches", "Coal and sticks to torches", torch_steps())
            .unwrap();
        let (template, custom) = library.template("make_torches").unwrap();
        assert!(custom);
        assert_eq!(template.steps.len(), 2);

        let (template, custom) = library.template("get_wood").unwrap();
        assert!(!custom);
        assert_eq!(template.name, "get_wood");
    }

    #[test]
    fn builtin_names_and_bad_names_are_rejected() {
        let mut library = ChainLibrary::default();
        assert_eq!(
            library.save_chain("get_wood", "", torch_steps()),
            Err(ChainDefinitionError::BuiltinClash {
                name: "get_wood".to_string()
            })
        );
        assert!(matches!(
            library.save_chain("Make-Torches", "", torch_steps()),
            Err(ChainDefinitionError::InvalidName { .. })
        ));
    }

    #[test]
    fn step_rules_are_enforced() {
        let craft_only = vec![Step::craft(Operation::craft("torch")).with_skip_if(&[("torch", 4)])];
        assert_eq!(
            validate_chain("torches", &craft_only, false),
            Err(ChainDefinitionError::NoGatherStep)
        );

        let craft_without_skip = vec![
            Step::search(Operation::mine("coal_ore", 2), "coal_ore").with_skip_if(&[("coal", 2)]),
            Step::craft(Operation::craft("torch")),
        ];
        assert_eq!(
            validate_chain("torches", &craft_without_skip, false),
            Err(ChainDefinitionError::MissingSkipIf {
                index: 1,
                kind: "craft".to_string()
            })
        );

        let mut untargeted = Step::search(Operation::mine("coal_ore", 2), "coal_ore")
            .with_skip_if(&[("coal", 2)]);
        untargeted.search_target = None;
        assert_eq!(
            validate_chain("torches", &[untargeted], false),
            Err(ChainDefinitionError::MissingSearchTarget { index: 0 })
        );

        let too_long: Vec<Step> = (0..31).map(|_| Step::action(Operation::EatFood {})).collect();
        assert!(matches!(
            validate_chain("feast", &too_long, false),
            Err(ChainDefinitionError::StepCount { count: 31, .. })
        ));
    }

    #[test]
    fn outcomes_persist_with_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_chains.json");

        let mut library = ChainLibrary::new(CustomChainStore::open(&path).unwrap());
        library.save_chain("make_torches", "", torch_steps()).unwrap();
        library.record_outcome("make_torches", true);
        library.record_outcome("make_torches", false);
        library.record_outcome("get_wood", true);

        let store = CustomChainStore::open(&path).unwrap();
        let chain = store.get("make_torches").unwrap();
        assert_eq!(chain.success_count, 1);
        assert_eq!(chain.failure_count, 1);
    }
}
