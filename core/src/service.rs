use std::path::Path;

use anyhow::{Context, Result};

use crate::db::Database;
use crate::models::{
    self, ExtraIngredient, ImportedIngredient, Ingredient, MenuEntry, MenuItem,
    NewExtraIngredient, Recipe, RecipeDetail, RecipeIngredientUpsert, RecipeSearch, RecipeUpsert,
    Scoped, ShoppingListLine, Subcategory, UserId,
};
use crate::shopping;

/// Entry point for every surface. User-owned data is only reachable through
/// methods taking the resolved user; with `None` they return
/// `Scoped::Unauthenticated` without touching the database.
pub struct BasketService {
    db: Database,
}

impl BasketService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    fn scoped<T>(
        user: Option<&UserId>,
        operation: &str,
        f: impl FnOnce(&UserId) -> Result<T>,
    ) -> Result<Scoped<T>> {
        match user {
            Some(user) => f(user).map(Scoped::Authenticated),
            None => {
                tracing::debug!(operation, "no signed-in user, skipping");
                Ok(Scoped::Unauthenticated)
            }
        }
    }

    // --- Recipes ---

    pub fn find_by_name(&self, user: Option<&UserId>, query: &str) -> Result<Scoped<Vec<Recipe>>> {
        self.search_recipes(user, RecipeSearch::Name, query)
    }

    pub fn find_by_instruction(
        &self,
        user: Option<&UserId>,
        query: &str,
    ) -> Result<Scoped<Vec<Recipe>>> {
        self.search_recipes(user, RecipeSearch::Instruction, query)
    }

    pub fn find_by_ingredient_name(
        &self,
        user: Option<&UserId>,
        query: &str,
    ) -> Result<Scoped<Vec<Recipe>>> {
        self.search_recipes(user, RecipeSearch::Ingredient, query)
    }

    pub fn search_recipes(
        &self,
        user: Option<&UserId>,
        by: RecipeSearch,
        query: &str,
    ) -> Result<Scoped<Vec<Recipe>>> {
        Self::scoped(user, "search_recipes", |user| {
            self.db.search_recipes(user, by, query)
        })
    }

    pub fn get_recipe(
        &self,
        user: Option<&UserId>,
        id: &str,
    ) -> Result<Scoped<Option<RecipeDetail>>> {
        Self::scoped(user, "get_recipe", |user| self.db.get_recipe_detail(user, id))
    }

    pub fn upsert_recipe(
        &self,
        user: Option<&UserId>,
        recipe: &RecipeUpsert,
    ) -> Result<Scoped<String>> {
        Self::scoped(user, "upsert_recipe", |user| {
            models::validate_recipe_upsert(recipe)?;
            let id = self.db.upsert_recipe(user, recipe)?;
            tracing::debug!(%id, "saved recipe");
            Ok(id)
        })
    }

    pub fn delete_recipe(&self, user: Option<&UserId>, id: &str) -> Result<Scoped<()>> {
        Self::scoped(user, "delete_recipe", |user| {
            self.db.delete_recipe(user, id)?;
            tracing::info!(%id, "deleted recipe");
            Ok(())
        })
    }

    pub fn upsert_recipe_ingredient(
        &self,
        user: Option<&UserId>,
        ingredient: &RecipeIngredientUpsert,
    ) -> Result<Scoped<String>> {
        Self::scoped(user, "upsert_recipe_ingredient", |user| {
            models::validate_ingredient_upsert(ingredient)?;
            self.db.upsert_recipe_ingredient(user, ingredient)
        })
    }

    pub fn delete_recipe_ingredient(
        &self,
        user: Option<&UserId>,
        recipe_id: &str,
        ingredient_id: &str,
    ) -> Result<Scoped<bool>> {
        Self::scoped(user, "delete_recipe_ingredient", |user| {
            self.db
                .delete_recipe_ingredient(user, recipe_id, ingredient_id)
        })
    }

    /// Create a new recipe together with its ingredient lines.
    pub fn import_recipe(
        &self,
        user: Option<&UserId>,
        recipe: &RecipeUpsert,
        ingredients: &[ImportedIngredient],
    ) -> Result<Scoped<RecipeDetail>> {
        Self::scoped(user, "import_recipe", |user| {
            models::validate_recipe_upsert(recipe)?;
            let lines: Vec<RecipeIngredientUpsert> = ingredients
                .iter()
                .map(|ingredient| RecipeIngredientUpsert {
                    id: None,
                    recipe_id: String::new(),
                    ingredient_name: ingredient.name.clone(),
                    quantity: ingredient.quantity,
                    unit: ingredient.unit.clone(),
                })
                .collect();
            for line in &lines {
                models::validate_ingredient_upsert(line)?;
            }

            let recipe_id = self.db.import_recipe(user, recipe, &lines)?;
            tracing::info!(%recipe_id, ingredients = ingredients.len(), "imported recipe");

            self.db
                .get_recipe_detail(user, &recipe_id)?
                .context("Recipe not found after import")
        })
    }

    // --- Menu ---

    pub fn add_to_menu(
        &self,
        user: Option<&UserId>,
        recipe_id: &str,
        portions: i64,
    ) -> Result<Scoped<MenuEntry>> {
        Self::scoped(user, "add_to_menu", |user| {
            models::validate_portions(portions)?;
            self.db.add_to_menu(user, recipe_id, portions)
        })
    }

    pub fn remove_from_menu(&self, user: Option<&UserId>, recipe_id: &str) -> Result<Scoped<()>> {
        Self::scoped(user, "remove_from_menu", |user| {
            self.db.remove_from_menu(user, recipe_id)
        })
    }

    pub fn list_menu(&self, user: Option<&UserId>) -> Result<Scoped<Vec<MenuItem>>> {
        Self::scoped(user, "list_menu", |user| self.db.list_menu(user))
    }

    // --- Shopping list ---

    /// Flattened ingredient lines of every menu recipe, in store order.
    pub fn shopping_list(&self, user: Option<&UserId>) -> Result<Scoped<Vec<ShoppingListLine>>> {
        Self::scoped(user, "shopping_list", |user| {
            let planned = self.db.planned_recipes(user)?;
            let mut lines = shopping::flatten(&planned);
            shopping::sort_by_store_order(&mut lines, &self.db.store_order()?);
            tracing::debug!(
                recipes = planned.len(),
                lines = lines.len(),
                "built shopping list"
            );
            Ok(lines)
        })
    }

    pub fn store_order(&self) -> Result<Vec<Subcategory>> {
        self.db.store_order()
    }

    // --- Catalog ---

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        self.db.list_ingredients()
    }

    pub fn add_subcategory(&self, name: &str) -> Result<Subcategory> {
        let name = models::validate_name("name", name)?;
        self.db.add_subcategory(&name)
    }

    pub fn set_ingredient(&self, name: &str, subcategory_id: Option<i64>) -> Result<Ingredient> {
        let name = models::validate_name("name", name)?;
        self.db.set_ingredient(&name, subcategory_id)
    }

    // --- Extra ingredients ---

    pub fn list_extra_ingredients(
        &self,
        user: Option<&UserId>,
    ) -> Result<Scoped<Vec<ExtraIngredient>>> {
        Self::scoped(user, "list_extra_ingredients", |user| {
            self.db.list_extra_ingredients(user)
        })
    }

    pub fn upsert_extra_ingredient(
        &self,
        user: Option<&UserId>,
        item: &NewExtraIngredient,
    ) -> Result<Scoped<ExtraIngredient>> {
        Self::scoped(user, "upsert_extra_ingredient", |user| {
            models::validate_extra_ingredient(item)?;
            self.db.upsert_extra_ingredient(user, item)
        })
    }

    pub fn remove_extra_ingredient(
        &self,
        user: Option<&UserId>,
        name: &str,
    ) -> Result<Scoped<bool>> {
        Self::scoped(user, "remove_extra_ingredient", |user| {
            self.db.remove_extra_ingredient(user, name.trim())
        })
    }
}
