use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::Local;
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, functions::FunctionFlags, params, types::Type,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::models::{
    ExtraIngredient, Ingredient, MenuEntry, MenuItem, NewExtraIngredient, PlannedIngredient,
    PlannedRecipe, Recipe, RecipeDetail, RecipeIngredient, RecipeIngredientUpsert, RecipeSearch,
    RecipeUpsert, Subcategory, UserId, ValidationError,
};

/// A row that does not exist, or exists but belongs to another user.
#[derive(Debug)]
pub struct NotFound(pub String);

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NotFound {}

const RECIPE_COLUMNS: &str = "id, user_id, name, portions, instruction, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        // Not persisted by SQLite; must be set on every connection.
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.register_functions()?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS subcategories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    name TEXT PRIMARY KEY NOT NULL,
                    subcategory_id INTEGER REFERENCES subcategories(id) ON DELETE SET NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id TEXT PRIMARY KEY NOT NULL,
                    user_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    portions INTEGER NOT NULL,
                    instruction TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id TEXT PRIMARY KEY NOT NULL,
                    recipe_id TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_name TEXT NOT NULL REFERENCES ingredients(name),
                    quantity TEXT NOT NULL,
                    unit TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS menu (
                    recipe_id TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    user_id TEXT NOT NULL,
                    portions INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (recipe_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS extra_ingredients (
                    name TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    quantity TEXT NOT NULL,
                    unit TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (name, user_id)
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_user ON recipes(user_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_menu_user ON menu(user_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// `fold(text)` lowercases with full Unicode case mapping. SQLite's own
    /// `LIKE` and `lower()` only fold ASCII.
    fn register_functions(&self) -> Result<()> {
        self.conn.create_scalar_function(
            "fold",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<String>(0)?.to_lowercase()),
        )?;
        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects RECIPE_COLUMNS starting at `base`.
    fn recipe_at(row: &rusqlite::Row, base: usize) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(base)?,
            user_id: row.get(base + 1)?,
            name: row.get(base + 2)?,
            portions: row.get(base + 3)?,
            instruction: row.get(base + 4)?,
            created_at: row.get(base + 5)?,
            updated_at: row.get(base + 6)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Self::recipe_at(row, 0)
    }

    fn recipe_ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<RecipeIngredient> {
        Ok(RecipeIngredient {
            id: row.get(0)?,
            recipe_id: row.get(1)?,
            ingredient_name: row.get(2)?,
            quantity: decimal_column(row, 3)?,
            unit: row.get(4)?,
        })
    }

    fn extra_ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<ExtraIngredient> {
        let quantity = decimal_column(row, 2)?;
        Ok(ExtraIngredient {
            name: row.get(0)?,
            user_id: row.get(1)?,
            quantity: quantity.to_f64().ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    Type::Text,
                    format!("quantity {quantity} does not fit in f64").into(),
                )
            })?,
            unit: row.get(3)?,
        })
    }

    // --- Recipes ---

    pub fn search_recipes(
        &self,
        user: &UserId,
        by: RecipeSearch,
        query: &str,
    ) -> Result<Vec<Recipe>> {
        let filter = match by {
            RecipeSearch::Name => "fold(name) LIKE ?2 ESCAPE '\\'",
            RecipeSearch::Instruction => "fold(instruction) LIKE ?2 ESCAPE '\\'",
            RecipeSearch::Ingredient => {
                "EXISTS (
                    SELECT 1 FROM recipe_ingredients ri
                    WHERE ri.recipe_id = recipes.id AND fold(ri.ingredient_name) LIKE ?2 ESCAPE '\\'
                )"
            }
        };
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes
             WHERE user_id = ?1 AND {filter}
             ORDER BY name COLLATE NOCASE, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let recipes = stmt
            .query_map(
                params![user.as_str(), like_pattern(&query.to_lowercase())],
                Self::recipe_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn get_recipe(&self, user: &UserId, id: &str) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1 AND user_id = ?2"),
                params![id, user.as_str()],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn get_recipe_detail(&self, user: &UserId, id: &str) -> Result<Option<RecipeDetail>> {
        let Some(recipe) = self.get_recipe(user, id)? else {
            return Ok(None);
        };
        let ingredients = self.get_recipe_ingredients(&recipe.id)?;
        Ok(Some(RecipeDetail {
            recipe,
            ingredients,
        }))
    }

    fn get_recipe_ingredients(&self, recipe_id: &str) -> Result<Vec<RecipeIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recipe_id, ingredient_name, quantity, unit
             FROM recipe_ingredients
             WHERE recipe_id = ?1
             ORDER BY rowid",
        )?;
        let ingredients = stmt
            .query_map(params![recipe_id], Self::recipe_ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    /// Create the recipe, or update name/portions/instruction of an existing one.
    ///
    /// Rows owned by another user are never updated; that case reports the
    /// recipe as not found.
    pub fn upsert_recipe(&self, user: &UserId, recipe: &RecipeUpsert) -> Result<String> {
        let now = Local::now().to_rfc3339();
        let id = recipe
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), String::from);
        let rows = self.conn.execute(
            "INSERT INTO recipes (id, user_id, name, portions, instruction, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                portions = excluded.portions,
                instruction = excluded.instruction,
                updated_at = excluded.updated_at
             WHERE recipes.user_id = excluded.user_id",
            params![
                id,
                user.as_str(),
                recipe.name.trim(),
                recipe.portions,
                recipe.instruction,
                now,
            ],
        )?;
        if rows == 0 {
            bail!(NotFound(format!("Recipe {id} not found")));
        }
        Ok(id)
    }

    pub fn delete_recipe(&self, user: &UserId, id: &str) -> Result<()> {
        // Ingredients and menu entries go with it via ON DELETE CASCADE
        let rows = self.conn.execute(
            "DELETE FROM recipes WHERE id = ?1 AND user_id = ?2",
            params![id, user.as_str()],
        )?;
        if rows == 0 {
            bail!(NotFound(format!("Recipe {id} not found")));
        }
        Ok(())
    }

    fn require_recipe(&self, user: &UserId, recipe_id: &str) -> Result<()> {
        let owned = self
            .conn
            .query_row(
                "SELECT 1 FROM recipes WHERE id = ?1 AND user_id = ?2",
                params![recipe_id, user.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        if owned.is_none() {
            bail!(NotFound(format!("Recipe {recipe_id} not found")));
        }
        Ok(())
    }

    fn touch_recipe(&self, recipe_id: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE recipes SET updated_at = ?1 WHERE id = ?2",
            params![now, recipe_id],
        )?;
        Ok(())
    }

    /// Create an ingredient line, or update quantity/unit of an existing one.
    ///
    /// A new line whose name is not in the catalog registers it there without
    /// a subcategory.
    pub fn upsert_recipe_ingredient(
        &self,
        user: &UserId,
        ingredient: &RecipeIngredientUpsert,
    ) -> Result<String> {
        let tx = self.conn.unchecked_transaction()?;
        let id = self.write_recipe_ingredient(user, ingredient)?;
        tx.commit()?;
        Ok(id)
    }

    /// Create a recipe and all of its ingredient lines, or nothing at all.
    pub fn import_recipe(
        &self,
        user: &UserId,
        recipe: &RecipeUpsert,
        lines: &[RecipeIngredientUpsert],
    ) -> Result<String> {
        let tx = self.conn.unchecked_transaction()?;
        let recipe_id = self.upsert_recipe(user, recipe)?;
        for line in lines {
            let line = RecipeIngredientUpsert {
                recipe_id: recipe_id.clone(),
                ..line.clone()
            };
            self.write_recipe_ingredient(user, &line)?;
        }
        tx.commit()?;
        Ok(recipe_id)
    }

    // Callers hold a transaction; a NotFound must not leave a catalog row behind.
    fn write_recipe_ingredient(
        &self,
        user: &UserId,
        ingredient: &RecipeIngredientUpsert,
    ) -> Result<String> {
        self.require_recipe(user, &ingredient.recipe_id)?;

        let id = ingredient
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), String::from);
        let name = ingredient.ingredient_name.trim();

        // Updates keep the stored name, so only new lines touch the catalog
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM recipe_ingredients WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            self.conn.execute(
                "INSERT OR IGNORE INTO ingredients (name) VALUES (?1)",
                params![name],
            )?;
        }

        let rows = self.conn.execute(
            "INSERT INTO recipe_ingredients (id, recipe_id, ingredient_name, quantity, unit)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                quantity = excluded.quantity,
                unit = excluded.unit
             WHERE recipe_ingredients.recipe_id = excluded.recipe_id",
            params![
                id,
                ingredient.recipe_id,
                name,
                ingredient.quantity.normalize().to_string(),
                ingredient.unit.trim(),
            ],
        )?;
        if rows == 0 {
            bail!(NotFound(format!(
                "Ingredient {id} not found in recipe {}",
                ingredient.recipe_id
            )));
        }
        self.touch_recipe(&ingredient.recipe_id)?;
        Ok(id)
    }

    pub fn delete_recipe_ingredient(
        &self,
        user: &UserId,
        recipe_id: &str,
        ingredient_id: &str,
    ) -> Result<bool> {
        self.require_recipe(user, recipe_id)?;
        let rows = self.conn.execute(
            "DELETE FROM recipe_ingredients WHERE id = ?1 AND recipe_id = ?2",
            params![ingredient_id, recipe_id],
        )?;
        if rows > 0 {
            self.touch_recipe(recipe_id)?;
        }
        Ok(rows > 0)
    }

    // --- Menu ---

    /// Plan one of the user's recipes. A second entry for the same recipe is a
    /// constraint violation from SQLite.
    pub fn add_to_menu(&self, user: &UserId, recipe_id: &str, portions: i64) -> Result<MenuEntry> {
        self.require_recipe(user, recipe_id)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO menu (recipe_id, user_id, portions, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![recipe_id, user.as_str(), portions, now],
        )?;
        Ok(MenuEntry {
            recipe_id: recipe_id.to_string(),
            user_id: user.as_str().to_string(),
            portions,
            created_at: now,
        })
    }

    pub fn remove_from_menu(&self, user: &UserId, recipe_id: &str) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM menu WHERE recipe_id = ?1 AND user_id = ?2",
            params![recipe_id, user.as_str()],
        )?;
        if rows == 0 {
            bail!(NotFound(format!("Menu entry for recipe {recipe_id} not found")));
        }
        Ok(())
    }

    pub fn list_menu(&self, user: &UserId) -> Result<Vec<MenuItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.recipe_id, m.user_id, m.portions, m.created_at,
                    r.id, r.user_id, r.name, r.portions, r.instruction, r.created_at, r.updated_at
             FROM menu m
             JOIN recipes r ON r.id = m.recipe_id AND r.user_id = m.user_id
             WHERE m.user_id = ?1
             ORDER BY m.rowid",
        )?;
        let items = stmt
            .query_map(params![user.as_str()], |row| {
                Ok(MenuItem {
                    entry: MenuEntry {
                        recipe_id: row.get(0)?,
                        user_id: row.get(1)?,
                        portions: row.get(2)?,
                        created_at: row.get(3)?,
                    },
                    recipe: Self::recipe_at(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Every menu recipe of the user with its ingredient lines and their
    /// catalog subcategory, in menu order.
    pub fn planned_recipes(&self, user: &UserId) -> Result<Vec<PlannedRecipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.recipe_id, r.name, m.portions,
                    ri.id, ri.ingredient_name, ri.quantity, ri.unit, i.subcategory_id
             FROM menu m
             JOIN recipes r ON r.id = m.recipe_id AND r.user_id = m.user_id
             LEFT JOIN recipe_ingredients ri ON ri.recipe_id = r.id
             LEFT JOIN ingredients i ON i.name = ri.ingredient_name
             WHERE m.user_id = ?1
             ORDER BY m.rowid, ri.rowid",
        )?;
        let mut rows = stmt.query(params![user.as_str()])?;

        let mut planned: Vec<PlannedRecipe> = Vec::new();
        while let Some(row) = rows.next()? {
            let recipe_id: String = row.get(0)?;
            let starts_recipe = planned.last().is_none_or(|p| p.recipe_id != recipe_id);
            if starts_recipe {
                planned.push(PlannedRecipe {
                    recipe_id,
                    recipe_name: row.get(1)?,
                    portions: row.get(2)?,
                    ingredients: Vec::new(),
                });
            }

            // Recipes without ingredients come back as one row of NULLs
            let Some(id) = row.get::<_, Option<String>>(3)? else {
                continue;
            };
            let ingredient = PlannedIngredient {
                id,
                name: row.get(4)?,
                quantity: decimal_column(row, 5)?,
                unit: row.get(6)?,
                subcategory_id: row.get(7)?,
            };
            if let Some(current) = planned.last_mut() {
                current.ingredients.push(ingredient);
            }
        }
        Ok(planned)
    }

    // --- Catalog ---

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, subcategory_id FROM ingredients ORDER BY name COLLATE NOCASE")?;
        let ingredients = stmt
            .query_map([], |row| {
                Ok(Ingredient {
                    name: row.get(0)?,
                    subcategory_id: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    pub fn set_ingredient(&self, name: &str, subcategory_id: Option<i64>) -> Result<Ingredient> {
        let name = name.trim();
        self.conn.execute(
            "INSERT INTO ingredients (name, subcategory_id) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET subcategory_id = excluded.subcategory_id",
            params![name, subcategory_id],
        )?;
        Ok(Ingredient {
            name: name.to_string(),
            subcategory_id,
        })
    }

    /// All subcategories in store order.
    pub fn store_order(&self) -> Result<Vec<Subcategory>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM subcategories ORDER BY id")?;
        let subcategories = stmt
            .query_map([], |row| {
                Ok(Subcategory {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subcategories)
    }

    pub fn add_subcategory(&self, name: &str) -> Result<Subcategory> {
        let name = name.trim();
        self.conn.execute(
            "INSERT INTO subcategories (name) VALUES (?1)",
            params![name],
        )?;
        Ok(Subcategory {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    // --- Extra ingredients ---

    pub fn list_extra_ingredients(&self, user: &UserId) -> Result<Vec<ExtraIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, user_id, quantity, unit FROM extra_ingredients
             WHERE user_id = ?1
             ORDER BY name COLLATE NOCASE",
        )?;
        let extras = stmt
            .query_map(params![user.as_str()], Self::extra_ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(extras)
    }

    fn get_extra_ingredient(&self, user: &UserId, name: &str) -> Result<Option<ExtraIngredient>> {
        let extra = self
            .conn
            .query_row(
                "SELECT name, user_id, quantity, unit FROM extra_ingredients
                 WHERE name = ?1 AND user_id = ?2",
                params![name, user.as_str()],
                Self::extra_ingredient_from_row,
            )
            .optional()?;
        Ok(extra)
    }

    pub fn upsert_extra_ingredient(
        &self,
        user: &UserId,
        item: &NewExtraIngredient,
    ) -> Result<ExtraIngredient> {
        let quantity = Decimal::try_from(item.quantity)
            .map_err(|e| ValidationError(format!("Invalid quantity {}: {e}", item.quantity)))?
            .normalize();
        let name = item.name.trim();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO extra_ingredients (name, user_id, quantity, unit, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name, user_id) DO UPDATE SET
                quantity = excluded.quantity,
                unit = excluded.unit,
                updated_at = excluded.updated_at",
            params![name, user.as_str(), quantity.to_string(), item.unit.trim(), now],
        )?;
        self.get_extra_ingredient(user, name)?
            .context("Extra ingredient not found after upsert")
    }

    pub fn remove_extra_ingredient(&self, user: &UserId, name: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM extra_ingredients WHERE name = ?1 AND user_id = ?2",
            params![name, user.as_str()],
        )?;
        Ok(rows > 0)
    }
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<NotFound>())
}

/// True when the error chain holds a SQLite constraint violation
/// (duplicate key, dangling foreign key).
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<rusqlite::Error>()
            .and_then(rusqlite::Error::sqlite_error_code)
            == Some(ErrorCode::ConstraintViolation)
    })
}

fn decimal_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Build a `LIKE` pattern matching `query` anywhere, with wildcards escaped.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> UserId {
        UserId::new("ana@example.com")
    }

    fn bob() -> UserId {
        UserId::new("bob@example.com")
    }

    fn new_recipe(name: &str) -> RecipeUpsert {
        RecipeUpsert {
            id: None,
            name: name.to_string(),
            portions: 4,
            instruction: String::new(),
        }
    }

    fn new_line(recipe_id: &str, name: &str, quantity: Decimal, unit: &str) -> RecipeIngredientUpsert {
        RecipeIngredientUpsert {
            id: None,
            recipe_id: recipe_id.to_string(),
            ingredient_name: name.to_string(),
            quantity,
            unit: unit.to_string(),
        }
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_search_by_name_case_insensitive_substring() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_recipe(&ana(), &new_recipe("Tomato Soup")).unwrap();
        db.upsert_recipe(&ana(), &new_recipe("Pancakes")).unwrap();

        for query in ["tomato", "SOUP", "o So"] {
            let found = db.search_recipes(&ana(), RecipeSearch::Name, query).unwrap();
            assert_eq!(found.len(), 1, "query {query:?}");
            assert_eq!(found[0].name, "Tomato Soup");
        }
        assert!(
            db.search_recipes(&ana(), RecipeSearch::Name, "curry")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_search_empty_query_lists_all() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_recipe(&ana(), &new_recipe("b")).unwrap();
        db.upsert_recipe(&ana(), &new_recipe("A")).unwrap();

        let all = db.search_recipes(&ana(), RecipeSearch::Name, "").unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "b"]);
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_recipe(&ana(), &new_recipe("100% rye")).unwrap();
        db.upsert_recipe(&ana(), &new_recipe("Rye bread")).unwrap();

        let found = db.search_recipes(&ana(), RecipeSearch::Name, "%").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "100% rye");
        assert!(
            db.search_recipes(&ana(), RecipeSearch::Name, "_")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_search_by_instruction() {
        let db = Database::open_in_memory().unwrap();
        let mut recipe = new_recipe("Risotto");
        recipe.instruction = "Stir constantly for 20 minutes".to_string();
        db.upsert_recipe(&ana(), &recipe).unwrap();

        let found = db
            .search_recipes(&ana(), RecipeSearch::Instruction, "STIR")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(
            db.search_recipes(&ana(), RecipeSearch::Name, "stir")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_search_by_ingredient_matches_any_line() {
        let db = Database::open_in_memory().unwrap();
        let soup = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        let cake = db.upsert_recipe(&ana(), &new_recipe("Cake")).unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&soup, "Carrot", Decimal::ONE, "pcs"))
            .unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&soup, "Onion", Decimal::ONE, "pcs"))
            .unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&cake, "Flour", Decimal::ONE, "kg"))
            .unwrap();

        let found = db
            .search_recipes(&ana(), RecipeSearch::Ingredient, "oni")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, soup);
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let db = Database::open_in_memory().unwrap();
        let mut recipe = new_recipe("Äppelkaka");
        recipe.instruction = "Vispa GRÄDDE".to_string();
        let id = db.upsert_recipe(&ana(), &recipe).unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&id, "Ägg", Decimal::TWO, "pcs"))
            .unwrap();

        for (by, query) in [
            (RecipeSearch::Name, "äppel"),
            (RecipeSearch::Name, "ÄPPELKAKA"),
            (RecipeSearch::Instruction, "grädde"),
            (RecipeSearch::Ingredient, "ägg"),
        ] {
            let found = db.search_recipes(&ana(), by, query).unwrap();
            assert_eq!(found.len(), 1, "{by:?} {query:?}");
        }
    }

    #[test]
    fn test_search_is_scoped_to_user() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_recipe(&ana(), &new_recipe("Tomato Soup")).unwrap();

        assert!(
            db.search_recipes(&bob(), RecipeSearch::Name, "tomato")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_upsert_recipe_is_idempotent_on_id() {
        let db = Database::open_in_memory().unwrap();
        let mut recipe = new_recipe("Soup");
        recipe.id = Some("recipe-1".to_string());

        assert_eq!(db.upsert_recipe(&ana(), &recipe).unwrap(), "recipe-1");
        recipe.name = "Better Soup".to_string();
        recipe.portions = 6;
        assert_eq!(db.upsert_recipe(&ana(), &recipe).unwrap(), "recipe-1");

        assert_eq!(count(&db, "recipes"), 1);
        let stored = db.get_recipe(&ana(), "recipe-1").unwrap().unwrap();
        assert_eq!(stored.name, "Better Soup");
        assert_eq!(stored.portions, 6);
    }

    #[test]
    fn test_upsert_recipe_unseen_id_creates_one_row() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_recipe(&ana(), &new_recipe("First")).unwrap();

        let mut recipe = new_recipe("Second");
        recipe.id = Some("fresh-id".to_string());
        db.upsert_recipe(&ana(), &recipe).unwrap();

        assert_eq!(count(&db, "recipes"), 2);
        assert!(db.get_recipe(&ana(), "fresh-id").unwrap().is_some());
    }

    #[test]
    fn test_upsert_recipe_generates_id() {
        let db = Database::open_in_memory().unwrap();
        let mut recipe = new_recipe("Soup");
        recipe.id = Some("  ".to_string());
        let id = db.upsert_recipe(&ana(), &recipe).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_upsert_recipe_keeps_ingredients() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&id, "Salt", Decimal::ONE, "tsp"))
            .unwrap();

        let mut update = new_recipe("Soup v2");
        update.id = Some(id.clone());
        db.upsert_recipe(&ana(), &update).unwrap();

        let detail = db.get_recipe_detail(&ana(), &id).unwrap().unwrap();
        assert_eq!(detail.recipe.name, "Soup v2");
        assert_eq!(detail.ingredients.len(), 1);
    }

    #[test]
    fn test_upsert_recipe_of_other_user_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();

        let mut hijack = new_recipe("Mine now");
        hijack.id = Some(id.clone());
        assert!(db.upsert_recipe(&bob(), &hijack).is_err());

        let stored = db.get_recipe(&ana(), &id).unwrap().unwrap();
        assert_eq!(stored.name, "Soup");
        assert_eq!(stored.user_id, "ana@example.com");
    }

    #[test]
    fn test_get_recipe_detail_scoped() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();

        assert!(db.get_recipe_detail(&ana(), &id).unwrap().is_some());
        assert!(db.get_recipe_detail(&bob(), &id).unwrap().is_none());
        assert!(db.get_recipe_detail(&ana(), "missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_ingredient_create_then_update() {
        let db = Database::open_in_memory().unwrap();
        let recipe_id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();

        let mut line = new_line(&recipe_id, "Salt", Decimal::new(5, 0), "g");
        let id = db.upsert_recipe_ingredient(&ana(), &line).unwrap();

        line.id = Some(id.clone());
        line.quantity = Decimal::new(75, 1);
        line.unit = "tsp".to_string();
        line.ingredient_name = "Pepper".to_string();
        assert_eq!(db.upsert_recipe_ingredient(&ana(), &line).unwrap(), id);

        let detail = db.get_recipe_detail(&ana(), &recipe_id).unwrap().unwrap();
        assert_eq!(detail.ingredients.len(), 1);
        let stored = &detail.ingredients[0];
        // Only quantity and unit change on update
        assert_eq!(stored.ingredient_name, "Salt");
        assert_eq!(stored.quantity, Decimal::new(75, 1));
        assert_eq!(stored.unit, "tsp");
    }

    #[test]
    fn test_upsert_ingredient_registers_catalog_name() {
        let db = Database::open_in_memory().unwrap();
        let recipe_id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&recipe_id, "Leek", Decimal::ONE, "pcs"))
            .unwrap();

        let catalog = db.list_ingredients().unwrap();
        assert_eq!(
            catalog,
            vec![Ingredient {
                name: "Leek".to_string(),
                subcategory_id: None,
            }]
        );
    }

    #[test]
    fn test_upsert_ingredient_requires_owned_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe_id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();

        let line = new_line(&recipe_id, "Salt", Decimal::ONE, "g");
        assert!(db.upsert_recipe_ingredient(&bob(), &line).is_err());
        assert_eq!(count(&db, "recipe_ingredients"), 0);
    }

    #[test]
    fn test_upsert_ingredient_cannot_move_between_recipes() {
        let db = Database::open_in_memory().unwrap();
        let soup = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        let cake = db.upsert_recipe(&ana(), &new_recipe("Cake")).unwrap();
        let id = db
            .upsert_recipe_ingredient(&ana(), &new_line(&soup, "Salt", Decimal::ONE, "g"))
            .unwrap();

        let mut moved = new_line(&cake, "Salt", Decimal::TWO, "g");
        moved.id = Some(id);
        assert!(db.upsert_recipe_ingredient(&ana(), &moved).is_err());
    }

    #[test]
    fn test_update_ingredient_does_not_grow_catalog() {
        let db = Database::open_in_memory().unwrap();
        let soup = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        let cake = db.upsert_recipe(&ana(), &new_recipe("Cake")).unwrap();
        let mut line = new_line(&soup, "Salt", Decimal::ONE, "g");
        line.id = Some(db.upsert_recipe_ingredient(&ana(), &line).unwrap());

        line.ingredient_name = "Typo".to_string();
        line.quantity = Decimal::TWO;
        db.upsert_recipe_ingredient(&ana(), &line).unwrap();

        let mut moved = line.clone();
        moved.recipe_id.clone_from(&cake);
        moved.ingredient_name = "Other".to_string();
        assert!(db.upsert_recipe_ingredient(&ana(), &moved).is_err());

        let names: Vec<String> = db
            .list_ingredients()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Salt"]);
    }

    #[test]
    fn test_import_recipe_writes_all_lines() {
        let db = Database::open_in_memory().unwrap();
        let lines = vec![
            new_line("", "Flour", Decimal::new(125, 0), "g"),
            new_line("", "Milk", Decimal::new(250, 0), "ml"),
        ];
        let id = db.import_recipe(&ana(), &new_recipe("Pancakes"), &lines).unwrap();

        let detail = db.get_recipe_detail(&ana(), &id).unwrap().unwrap();
        let names: Vec<&str> = detail
            .ingredients
            .iter()
            .map(|i| i.ingredient_name.as_str())
            .collect();
        assert_eq!(names, vec!["Flour", "Milk"]);
    }

    #[test]
    fn test_import_recipe_rolls_back_on_failure() {
        let db = Database::open_in_memory().unwrap();
        let soup = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        let taken = db
            .upsert_recipe_ingredient(&ana(), &new_line(&soup, "Salt", Decimal::ONE, "g"))
            .unwrap();

        // The second line reuses an id owned by another recipe
        let mut clash = new_line("", "Pepper", Decimal::ONE, "g");
        clash.id = Some(taken);
        let lines = vec![new_line("", "Flour", Decimal::ONE, "kg"), clash];
        let err = db
            .import_recipe(&ana(), &new_recipe("Bread"), &lines)
            .unwrap_err();
        assert!(is_not_found(&err));

        assert_eq!(count(&db, "recipes"), 1);
        assert_eq!(count(&db, "recipe_ingredients"), 1);
        let names: Vec<String> = db
            .list_ingredients()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Salt"]);
    }

    #[test]
    fn test_delete_recipe_ingredient() {
        let db = Database::open_in_memory().unwrap();
        let recipe_id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        let id = db
            .upsert_recipe_ingredient(&ana(), &new_line(&recipe_id, "Salt", Decimal::ONE, "g"))
            .unwrap();

        assert!(db.delete_recipe_ingredient(&ana(), &recipe_id, &id).unwrap());
        assert!(!db.delete_recipe_ingredient(&ana(), &recipe_id, &id).unwrap());
        assert!(db.delete_recipe_ingredient(&bob(), &recipe_id, &id).is_err());
    }

    #[test]
    fn test_delete_recipe_cascades() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&id, "Salt", Decimal::ONE, "g"))
            .unwrap();
        db.add_to_menu(&ana(), &id, 4).unwrap();

        db.delete_recipe(&ana(), &id).unwrap();

        assert_eq!(count(&db, "recipes"), 0);
        assert_eq!(count(&db, "recipe_ingredients"), 0);
        assert_eq!(count(&db, "menu"), 0);
        // Catalog is global reference data and stays
        assert_eq!(count(&db, "ingredients"), 1);
    }

    #[test]
    fn test_delete_recipe_requires_owner() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();

        assert!(db.delete_recipe(&bob(), &id).is_err());
        assert!(db.delete_recipe(&ana(), "missing").is_err());
        assert_eq!(count(&db, "recipes"), 1);
    }

    #[test]
    fn test_menu_add_list_remove() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();

        let entry = db.add_to_menu(&ana(), &id, 2).unwrap();
        assert_eq!(entry.portions, 2);

        let menu = db.list_menu(&ana()).unwrap();
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].recipe.name, "Soup");
        assert_eq!(menu[0].entry.portions, 2);

        db.remove_from_menu(&ana(), &id).unwrap();
        assert!(db.list_menu(&ana()).unwrap().is_empty());

        // Absent entry surfaces as not found
        let err = db.remove_from_menu(&ana(), &id).unwrap_err();
        assert!(is_not_found(&err));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_menu_duplicate_is_constraint_violation() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        db.add_to_menu(&ana(), &id, 2).unwrap();

        let err = db.add_to_menu(&ana(), &id, 3).unwrap_err();
        assert!(is_constraint_violation(&err));
        assert_eq!(db.list_menu(&ana()).unwrap()[0].entry.portions, 2);
    }

    #[test]
    fn test_menu_rejects_foreign_recipe() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();

        let err = db.add_to_menu(&bob(), &id, 2).unwrap_err();
        assert!(is_not_found(&err));
        assert!(!is_constraint_violation(&err));
        assert!(db.list_menu(&bob()).unwrap().is_empty());
        assert!(db.remove_from_menu(&bob(), &id).is_err());
    }

    #[test]
    fn test_planned_recipes_groups_lines() {
        let db = Database::open_in_memory().unwrap();
        let veg = db.add_subcategory("Vegetables").unwrap();
        db.set_ingredient("Carrot", Some(veg.id)).unwrap();

        let soup = db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        let toast = db.upsert_recipe(&ana(), &new_recipe("Toast")).unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&soup, "Carrot", Decimal::TWO, "pcs"))
            .unwrap();
        db.upsert_recipe_ingredient(&ana(), &new_line(&soup, "Salt", Decimal::ONE, "tsp"))
            .unwrap();
        db.add_to_menu(&ana(), &soup, 4).unwrap();
        db.add_to_menu(&ana(), &toast, 1).unwrap();

        let planned = db.planned_recipes(&ana()).unwrap();
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].recipe_name, "Soup");
        assert_eq!(planned[0].ingredients.len(), 2);
        assert_eq!(planned[0].ingredients[0].subcategory_id, Some(veg.id));
        assert_eq!(planned[0].ingredients[1].subcategory_id, None);
        assert_eq!(planned[1].recipe_name, "Toast");
        assert!(planned[1].ingredients.is_empty());

        assert!(db.planned_recipes(&bob()).unwrap().is_empty());
    }

    #[test]
    fn test_catalog_store_order() {
        let db = Database::open_in_memory().unwrap();
        let dairy = db.add_subcategory("Dairy").unwrap();
        let bakery = db.add_subcategory("Bakery").unwrap();
        assert!(dairy.id < bakery.id);

        let order: Vec<String> = db
            .store_order()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(order, vec!["Dairy", "Bakery"]);

        // Duplicate subcategory names are rejected by the schema
        let err = db.add_subcategory("Dairy").unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn test_set_ingredient_updates_subcategory() {
        let db = Database::open_in_memory().unwrap();
        let dairy = db.add_subcategory("Dairy").unwrap();
        db.set_ingredient("Milk", None).unwrap();
        db.set_ingredient("Milk", Some(dairy.id)).unwrap();

        let catalog = db.list_ingredients().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].subcategory_id, Some(dairy.id));

        let err = db.set_ingredient("Milk", Some(999)).unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn test_extra_ingredient_roundtrip_quantity() {
        let db = Database::open_in_memory().unwrap();
        let stored = db
            .upsert_extra_ingredient(
                &ana(),
                &NewExtraIngredient {
                    name: "Milk".to_string(),
                    quantity: 2.5,
                    unit: "l".to_string(),
                },
            )
            .unwrap();
        assert!((stored.quantity - 2.5).abs() < f64::EPSILON);

        let extras = db.list_extra_ingredients(&ana()).unwrap();
        assert_eq!(extras.len(), 1);
        assert!((extras[0].quantity - 2.5).abs() < f64::EPSILON);
        assert_eq!(extras[0].unit, "l");
    }

    #[test]
    fn test_extra_ingredient_upsert_by_name_and_user() {
        let db = Database::open_in_memory().unwrap();
        let milk = |quantity: f64| NewExtraIngredient {
            name: "Milk".to_string(),
            quantity,
            unit: "l".to_string(),
        };
        db.upsert_extra_ingredient(&ana(), &milk(1.0)).unwrap();
        db.upsert_extra_ingredient(&ana(), &milk(0.75)).unwrap();
        db.upsert_extra_ingredient(&bob(), &milk(3.0)).unwrap();

        assert_eq!(count(&db, "extra_ingredients"), 2);
        let extras = db.list_extra_ingredients(&ana()).unwrap();
        assert_eq!(extras.len(), 1);
        assert!((extras[0].quantity - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remove_extra_ingredient() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_extra_ingredient(
            &ana(),
            &NewExtraIngredient {
                name: "Eggs".to_string(),
                quantity: 12.0,
                unit: "pcs".to_string(),
            },
        )
        .unwrap();

        assert!(!db.remove_extra_ingredient(&bob(), "Eggs").unwrap());
        assert!(db.remove_extra_ingredient(&ana(), "Eggs").unwrap());
        assert!(db.list_extra_ingredients(&ana()).unwrap().is_empty());
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("a%b_c\\"), "%a\\%b\\_c\\\\%");
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let dir = std::env::temp_dir().join(format!("basket-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("basket.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_recipe(&ana(), &new_recipe("Soup")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
        assert_eq!(count(&db, "recipes"), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
