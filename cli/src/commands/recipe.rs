use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use basket_core::models::{
    ImportedIngredient, Recipe, RecipeIngredientUpsert, RecipeSearch, RecipeUpsert, UserId,
};
use basket_core::service::BasketService;

use super::helpers::{
    exit_empty, format_quantity, json_error, parse_quantity, print_json, signed_in, truncate,
};

pub(crate) fn cmd_recipe_search(
    svc: &BasketService,
    user: Option<&UserId>,
    query: &str,
    by: RecipeSearch,
    json: bool,
) -> Result<()> {
    let recipes = signed_in(svc.search_recipes(user, by, query)?, json);
    if recipes.is_empty() {
        exit_empty(json, "No recipes found");
    }

    if json {
        return print_json(&recipes);
    }
    print_recipe_table(&recipes);
    Ok(())
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Portions")]
        portions: i64,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id.clone(),
            name: truncate(&r.name, 40),
            portions: r.portions,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_recipe_show(
    svc: &BasketService,
    user: Option<&UserId>,
    id: &str,
    json: bool,
) -> Result<()> {
    let Some(detail) = signed_in(svc.get_recipe(user, id)?, json) else {
        if json {
            println!("{}", json_error(&format!("Recipe {id} not found")));
        } else {
            eprintln!("Recipe {id} not found");
        }
        process::exit(2);
    };

    if json {
        return print_json(&detail);
    }

    let name = &detail.recipe.name;
    let portions = detail.recipe.portions;
    println!("=== {name} ===");
    println!("  Portions: {portions}  |  ID: {}\n", detail.recipe.id);

    println!("  INGREDIENTS:");
    if detail.ingredients.is_empty() {
        println!("    (none)");
    }
    for ing in &detail.ingredients {
        let amount = format_quantity(ing.quantity, &ing.unit);
        println!("    {} - {amount}  [{}]", ing.ingredient_name, ing.id);
    }

    let instruction = detail.recipe.instruction.trim();
    if !instruction.is_empty() {
        println!("\n  INSTRUCTION:");
        for line in instruction.lines() {
            println!("    {line}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_recipe_save(
    svc: &BasketService,
    user: Option<&UserId>,
    recipe: &RecipeUpsert,
    json: bool,
) -> Result<()> {
    let id = signed_in(svc.upsert_recipe(user, recipe)?, json);
    if json {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        println!("Saved recipe: {} (id: {id})", recipe.name.trim());
        if recipe.id.is_none() {
            println!("Add ingredients with: basket recipe ingredient {id} <name> <quantity> [unit]");
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(
    svc: &BasketService,
    user: Option<&UserId>,
    id: &str,
    json: bool,
) -> Result<()> {
    signed_in(svc.delete_recipe(user, id)?, json);
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted recipe {id}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_ingredient(
    svc: &BasketService,
    user: Option<&UserId>,
    ingredient: &RecipeIngredientUpsert,
    json: bool,
) -> Result<()> {
    let id = signed_in(svc.upsert_recipe_ingredient(user, ingredient)?, json);
    if json {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        let amount = format_quantity(ingredient.quantity, ingredient.unit.trim());
        println!(
            "Saved {} ({amount}) on recipe {} (id: {id})",
            ingredient.ingredient_name.trim(),
            ingredient.recipe_id
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_remove_ingredient(
    svc: &BasketService,
    user: Option<&UserId>,
    recipe_id: &str,
    ingredient_id: &str,
    json: bool,
) -> Result<()> {
    if signed_in(
        svc.delete_recipe_ingredient(user, recipe_id, ingredient_id)?,
        json,
    ) {
        if json {
            println!("{}", serde_json::json!({ "removed": ingredient_id }));
        } else {
            println!("Removed ingredient {ingredient_id} from recipe {recipe_id}");
        }
    } else {
        if json {
            println!(
                "{}",
                json_error(&format!("Ingredient '{ingredient_id}' not found in recipe"))
            );
        } else {
            eprintln!("Ingredient '{ingredient_id}' not found in recipe");
        }
        process::exit(2);
    }
    Ok(())
}

/// Parsed form of a quantity argument: `"2.5"` or `"2.5 kg"`.
pub(crate) fn parse_amount(quantity: &str, unit: Option<&str>) -> Result<(Decimal, String)> {
    if let Some(unit) = unit {
        return Ok((parse_quantity(quantity)?, unit.trim().to_string()));
    }
    match quantity.trim().split_once(char::is_whitespace) {
        Some((qty, unit)) => Ok((parse_quantity(qty)?, unit.trim().to_string())),
        None => Ok((parse_quantity(quantity)?, String::new())),
    }
}

pub(crate) fn cmd_recipe_import(
    svc: &BasketService,
    user: Option<&UserId>,
    file: &Path,
    name_override: Option<String>,
    portions_override: Option<i64>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let name = name_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe name. Use --name to specify one")?;

    let portions = portions_override
        .or_else(|| {
            recipe_data
                .metadata
                .servings()
                .and_then(|s| s.as_number().map(i64::from))
        })
        .unwrap_or(1);

    let converter = cooklang::Converter::default();
    let ingredients: Vec<ImportedIngredient> = recipe_data
        .group_ingredients(&converter)
        .iter()
        .map(cooklang_ingredient)
        .collect();

    let recipe = RecipeUpsert {
        id: None,
        name,
        portions,
        instruction: instruction_text(&recipe_data),
    };
    let detail = signed_in(svc.import_recipe(user, &recipe, &ingredients)?, json);

    if json {
        return print_json(&detail);
    }
    let rname = &detail.recipe.name;
    let ing_count = detail.ingredients.len();
    let id = &detail.recipe.id;
    println!("Imported recipe: {rname} ({ing_count} ingredients, {portions} portions, id: {id})");
    Ok(())
}

fn cooklang_ingredient(gi: &cooklang::ingredient_list::GroupedIngredient<'_>) -> ImportedIngredient {
    // Only the first grouped quantity is kept
    let (quantity, unit) = gi.quantity.iter().next().map_or(
        (Decimal::ONE, String::new()),
        |qty: &cooklang::Quantity| {
            let value = match qty.value() {
                cooklang::Value::Number(n) => Some(n.value()),
                cooklang::Value::Range { start, .. } => Some(start.value()),
                cooklang::Value::Text(t) => t.trim().parse::<f64>().ok(),
            };
            let quantity = value
                .and_then(|v| Decimal::try_from(v).ok())
                .map_or(Decimal::ONE, |d| d.round_dp(3).normalize());
            (quantity, qty.unit().unwrap_or_default().to_string())
        },
    );

    ImportedIngredient {
        name: gi.ingredient.display_name().to_string(),
        quantity,
        unit,
    }
}

/// Plain-text steps of a parsed recipe, one paragraph per line. Section
/// names and comments are not part of the text.
fn instruction_text(recipe: &cooklang::Recipe) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    for section in &recipe.sections {
        for content in &section.content {
            let text = match content {
                cooklang::Content::Step(step) => step
                    .items
                    .iter()
                    .map(|item| step_item_text(recipe, item))
                    .collect::<String>(),
                cooklang::Content::Text(text) => text.clone(),
            };
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                paragraphs.push(text);
            }
        }
    }
    paragraphs.join("\n")
}

fn step_item_text(recipe: &cooklang::Recipe, item: &cooklang::Item) -> String {
    match item {
        cooklang::Item::Text { value } => value.clone(),
        cooklang::Item::Ingredient { index } => recipe
            .ingredients
            .get(*index)
            .map(|i| i.display_name().into_owned())
            .unwrap_or_default(),
        cooklang::Item::Cookware { index } => recipe
            .cookware
            .get(*index)
            .map(|c| c.display_name().to_string())
            .unwrap_or_default(),
        // A timer reads as its duration, or its name when it has none
        cooklang::Item::Timer { index } => recipe
            .timers
            .get(*index)
            .and_then(|t| {
                t.quantity
                    .as_ref()
                    .map(ToString::to_string)
                    .or_else(|| t.name.clone())
            })
            .unwrap_or_default(),
        cooklang::Item::InlineQuantity { index } => recipe
            .inline_quantities
            .get(*index)
            .map(ToString::to_string)
            .unwrap_or_default(),
    }
}
