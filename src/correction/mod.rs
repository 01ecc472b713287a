// Correction module
// Recipe definitions and step correction of recognized actions

pub mod corrector;
pub mod recipe;

pub use corrector::{
    actions_from_predictions, correct_actions, fill_undefined, merge_continuous_steps, Action,
    Candidate, CorrectedAction, CorrectionError, PendingAction, DEFAULT_ALTERNATIVE_THRESHOLD,
};
pub use recipe::{check_recipe, Ingredient, Recipe, RecipeError, Step, StepTime};
