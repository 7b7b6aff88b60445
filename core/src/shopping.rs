use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};

use crate::models::{PlannedRecipe, ShoppingListLine, Subcategory};

/// One line per recipe ingredient across all planned recipes, in menu order.
///
/// Lines are not merged: "Salt" in two recipes stays two lines, each naming
/// the recipe it came from.
pub fn flatten(planned: &[PlannedRecipe]) -> Vec<ShoppingListLine> {
    planned
        .iter()
        .flat_map(|recipe| {
            recipe.ingredients.iter().map(|ingredient| ShoppingListLine {
                name: ingredient.name.clone(),
                quantity: ingredient.quantity,
                unit: ingredient.unit.clone(),
                sub_category: ingredient.subcategory_id,
                id: ingredient.id.clone(),
                recipe: recipe.recipe_name.clone(),
            })
        })
        .collect()
}

/// Stable sort by position of each line's subcategory in `store_order`.
/// Lines without a known subcategory go last.
pub fn sort_by_store_order(lines: &mut [ShoppingListLine], store_order: &[Subcategory]) {
    let position: HashMap<i64, usize> = store_order
        .iter()
        .enumerate()
        .map(|(idx, sub)| (sub.id, idx))
        .collect();
    lines.sort_by_key(|line| {
        line.sub_category
            .and_then(|id| position.get(&id).copied())
            .unwrap_or(usize::MAX)
    });
}

pub fn write_csv<W: Write>(lines: &[ShoppingListLine], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["name", "quantity", "unit", "sub_category", "recipe"])
        .context("Failed to write CSV header")?;
    for line in lines {
        let sub_category = line.sub_category.map(|id| id.to_string()).unwrap_or_default();
        wtr.write_record([
            line.name.as_str(),
            &line.quantity.normalize().to_string(),
            line.unit.as_str(),
            &sub_category,
            line.recipe.as_str(),
        ])
        .with_context(|| format!("Failed to write CSV row for {}", line.name))?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}
