use std::fmt;

use anyhow::{Result, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque identifier of the signed-in user, usually an email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a user-scoped operation.
///
/// `Unauthenticated` means no user was resolved and storage was never touched.
/// It is kept apart from an empty result so callers can tell "nothing matched"
/// from "not signed in".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scoped<T> {
    Authenticated(T),
    Unauthenticated,
}

impl<T> Scoped<T> {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scoped<U> {
        match self {
            Self::Authenticated(value) => Scoped::Authenticated(f(value)),
            Self::Unauthenticated => Scoped::Unauthenticated,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Authenticated(value) => Some(value),
            Self::Unauthenticated => None,
        }
    }
}

impl<T: Default> Scoped<T> {
    /// Collapse to the plain value, treating "not signed in" as empty.
    pub fn unwrap_or_default(self) -> T {
        self.into_option().unwrap_or_default()
    }
}

// --- Recipes ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub portions: i64,
    pub instruction: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub id: String,
    pub recipe_id: String,
    pub ingredient_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub unit: String,
}

/// A recipe together with all of its ingredient lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<RecipeIngredient>,
}

/// Input for creating or updating a recipe. A missing `id` always creates.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeUpsert {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub portions: i64,
    #[serde(default)]
    pub instruction: String,
}

/// Input for creating or updating one ingredient line of a recipe.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeIngredientUpsert {
    #[serde(default)]
    pub id: Option<String>,
    pub recipe_id: String,
    pub ingredient_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub unit: String,
}

/// An ingredient line read from an imported recipe file, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedIngredient {
    pub name: String,
    pub quantity: Decimal,
    pub unit: String,
}

/// Which recipe column a search matches against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeSearch {
    #[default]
    Name,
    Instruction,
    Ingredient,
}

// --- Menu ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuEntry {
    pub recipe_id: String,
    pub user_id: String,
    pub portions: i64,
    pub created_at: String,
}

/// A menu entry joined with the recipe it plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    #[serde(flatten)]
    pub entry: MenuEntry,
    pub recipe: Recipe,
}

/// A menu recipe with its ingredient lines, as read for the shopping list.
#[derive(Debug, Clone)]
pub struct PlannedRecipe {
    pub recipe_id: String,
    pub recipe_name: String,
    pub portions: i64,
    pub ingredients: Vec<PlannedIngredient>,
}

#[derive(Debug, Clone)]
pub struct PlannedIngredient {
    pub id: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit: String,
    pub subcategory_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingListLine {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub unit: String,
    pub sub_category: Option<i64>,
    pub id: String,
    pub recipe: String,
}

// --- Catalog ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub subcategory_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: i64,
    pub name: String,
}

// --- Extra ingredients ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtraIngredient {
    pub name: String,
    pub user_id: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExtraIngredient {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

// --- Validation ---

/// Input rejected before it reaches the database.
#[derive(Debug)]
pub struct ValidationError(pub String);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationError {}

pub fn is_validation_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<ValidationError>())
}

pub fn validate_name(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!(ValidationError(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn validate_portions(portions: i64) -> Result<()> {
    if portions <= 0 {
        bail!(ValidationError("portions must be greater than 0".to_string()));
    }
    Ok(())
}

pub fn validate_quantity(quantity: Decimal) -> Result<()> {
    if quantity.is_sign_negative() && !quantity.is_zero() {
        bail!(ValidationError("quantity must not be negative".to_string()));
    }
    Ok(())
}

pub fn validate_recipe_upsert(recipe: &RecipeUpsert) -> Result<()> {
    validate_name("name", &recipe.name)?;
    validate_portions(recipe.portions)
}

pub fn validate_ingredient_upsert(ingredient: &RecipeIngredientUpsert) -> Result<()> {
    validate_name("ingredient_name", &ingredient.ingredient_name)?;
    validate_quantity(ingredient.quantity)
}

pub fn validate_extra_ingredient(item: &NewExtraIngredient) -> Result<()> {
    validate_name("name", &item.name)?;
    if !item.quantity.is_finite() {
        bail!(ValidationError("quantity must be a finite number".to_string()));
    }
    if item.quantity < 0.0 {
        bail!(ValidationError("quantity must not be negative".to_string()));
    }
    Ok(())
}
