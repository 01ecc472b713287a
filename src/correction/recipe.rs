// Recipe model
// Ordered process steps that a recording is expected to follow, loaded from JSON

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RecipeError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid recipe JSON: {0}")]
    Json(String),

    #[error("Process not found {0}")]
    UnknownProcess(String),

    #[error("Invalid time format '{0}', expected h:m:s")]
    InvalidTime(String),

    #[error("Ingredient '{name}' needs a positive quantity, got {quantity}")]
    InvalidQuantity { name: String, quantity: f64 },

    #[error("Duplicate required group {0}")]
    DuplicateGroup(String),

    #[error("Duplicate required processId {0}")]
    DuplicateRequired(String),

    #[error("Loop detected {0}")]
    Loop(String),

    #[error("ProcessId not found {0}")]
    RequiredNotFound(String),
}

impl From<std::io::Error> for RecipeError {
    fn from(e: std::io::Error) -> Self {
        RecipeError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RecipeError {
    fn from(e: serde_json::Error) -> Self {
        RecipeError::Json(e.to_string())
    }
}

/// Expected duration of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl StepTime {
    /// Parse `h:m:s` (hour 0-23, minute and second 0-59)
    pub fn parse(text: &str) -> Result<Self, RecipeError> {
        let invalid = || RecipeError::InvalidTime(text.to_string());

        let parts = text
            .split(':')
            .map(|p| p.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let [hour, minute, second] = parts[..] else {
            return Err(invalid());
        };
        if hour > 23 || minute > 59 || second > 59 {
            return Err(invalid());
        }
        Ok(StepTime { hour, minute, second })
    }

    pub fn as_secs(&self) -> u32 {
        self.hour * 3600 + self.minute * 60 + self.second
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// One resolved step of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Process id; matches the action label name predicted for it
    pub process_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<StepTime>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub required_groups: Vec<String>,
}

impl Step {
    pub fn new(process_id: impl Into<String>, title: impl Into<String>) -> Self {
        Step {
            process_id: process_id.into(),
            title: title.into(),
            time: None,
            required: Vec::new(),
            required_groups: Vec::new(),
        }
    }

    /// Same process, title and time, with requirements contained in `other`'s
    pub fn same_as(&self, other: &Step) -> bool {
        self.process_id == other.process_id
            && self.title == other.title
            && self.time == other.time
            && self.required.iter().all(|r| other.required.contains(r))
            && self.required_groups.iter().all(|g| other.required_groups.contains(g))
    }
}

/// Reference to a process by id, as written in recipe files
#[derive(Debug, Clone, Deserialize)]
struct ProcessRef {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ProcessDef {
    id: String,
    title: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    required: Option<Vec<ProcessRef>>,
}

#[derive(Debug, Clone, Deserialize)]
struct StepDef {
    process: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    required: Option<Vec<ProcessRef>>,
    #[serde(default)]
    required_groups: Vec<String>,
}

/// Recipe file layout: processes are defined once, steps reference them in order
#[derive(Debug, Clone, Deserialize)]
struct RecipeFile {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    ingredients: Vec<Ingredient>,
    steps: Vec<StepDef>,
    processes: Vec<ProcessDef>,
}

/// A recipe with its steps resolved against the process table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
}

impl Recipe {
    /// Parse and resolve a recipe file, then check its requirements
    ///
    /// A step's own time and requirements override its process's.
    pub fn from_json(text: &str) -> Result<Self, RecipeError> {
        let file: RecipeFile = serde_json::from_str(text)?;

        for ingredient in &file.ingredients {
            if !(ingredient.quantity > 0.0) {
                return Err(RecipeError::InvalidQuantity {
                    name: ingredient.name.clone(),
                    quantity: ingredient.quantity,
                });
            }
        }

        let steps = file
            .steps
            .iter()
            .map(|def| {
                let process = file
                    .processes
                    .iter()
                    .find(|p| p.id == def.process)
                    .ok_or_else(|| RecipeError::UnknownProcess(def.process.clone()))?;

                let time = match def.time.as_deref().or(process.time.as_deref()) {
                    Some(text) => Some(StepTime::parse(text)?),
                    None => None,
                };
                let required = def
                    .required
                    .as_ref()
                    .or(process.required.as_ref())
                    .map(|refs| refs.iter().map(|r| r.id.clone()).collect())
                    .unwrap_or_default();

                Ok(Step {
                    process_id: def.process.clone(),
                    title: process.title.clone(),
                    time,
                    required,
                    required_groups: def.required_groups.clone(),
                })
            })
            .collect::<Result<Vec<_>, RecipeError>>()?;

        let recipe = Recipe {
            name: file.name,
            url: file.url,
            ingredients: file.ingredients,
            steps,
        };
        check_recipe(&recipe)?;
        Ok(recipe)
    }

    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let text = std::fs::read_to_string(path)?;
        let recipe = Self::from_json(&text)?;
        log::debug!("Loaded recipe '{}' with {} steps", recipe.name, recipe.steps.len());
        Ok(recipe)
    }
}

fn first_duplicate(items: &[String]) -> Option<&String> {
    items
        .iter()
        .enumerate()
        .find(|&(i, item)| items[..i].contains(item))
        .map(|(_, item)| item)
}

/// Check the requirement graph of every step
///
/// A step's groups must be unique, every required process must exist as a
/// step sharing one of those groups, and following requirements must never
/// revisit a process.
pub fn check_recipe(recipe: &Recipe) -> Result<(), RecipeError> {
    for step in &recipe.steps {
        check_required(recipe, &step.required, &step.required_groups, &[])?;
    }
    Ok(())
}

fn check_required(
    recipe: &Recipe,
    process_ids: &[String],
    groups: &[String],
    stacked: &[String],
) -> Result<(), RecipeError> {
    if let Some(group) = first_duplicate(groups) {
        return Err(RecipeError::DuplicateGroup(group.clone()));
    }

    for process_id in process_ids {
        let target = recipe
            .steps
            .iter()
            .find(|s| &s.process_id == process_id && s.required_groups.iter().any(|g| groups.contains(g)))
            .ok_or_else(|| RecipeError::RequiredNotFound(process_id.clone()))?;

        if let Some(id) = first_duplicate(&target.required) {
            return Err(RecipeError::DuplicateRequired(id.clone()));
        }

        let mut chain = target.required.clone();
        chain.extend_from_slice(stacked);
        if let Some(id) = first_duplicate(&chain) {
            return Err(RecipeError::Loop(id.clone()));
        }

        check_required(recipe, &target.required, groups, &chain)?;
    }
    Ok(())
}
