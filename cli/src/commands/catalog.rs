use anyhow::Result;
use std::collections::HashMap;
use tabled::{Table, Tabled, settings::Style};

use basket_core::service::BasketService;

use super::helpers::{exit_empty, print_json, truncate};

pub(crate) fn cmd_catalog_ingredients(svc: &BasketService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Subcategory")]
        subcategory: String,
    }

    let ingredients = svc.list_ingredients()?;
    if ingredients.is_empty() {
        exit_empty(json, "The ingredient catalog is empty");
    }
    if json {
        return print_json(&ingredients);
    }

    let names: HashMap<i64, String> = svc
        .store_order()?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();
    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            name: truncate(&i.name, 35),
            subcategory: i
                .subcategory_id
                .and_then(|id| names.get(&id).cloned())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_catalog_store_order(svc: &BasketService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct SubcategoryRow {
        #[tabled(rename = "#")]
        position: usize,
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Subcategory")]
        name: String,
    }

    let order = svc.store_order()?;
    if order.is_empty() {
        exit_empty(json, "No subcategories defined");
    }
    if json {
        return print_json(&order);
    }

    let rows: Vec<SubcategoryRow> = order
        .iter()
        .enumerate()
        .map(|(idx, s)| SubcategoryRow {
            position: idx + 1,
            id: s.id,
            name: s.name.clone(),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_catalog_add_subcategory(svc: &BasketService, name: &str, json: bool) -> Result<()> {
    let subcategory = svc.add_subcategory(name)?;
    if json {
        return print_json(&subcategory);
    }
    println!(
        "Added subcategory {} (id: {}) at the end of the store order",
        subcategory.name, subcategory.id
    );
    Ok(())
}

pub(crate) fn cmd_catalog_set_ingredient(
    svc: &BasketService,
    name: &str,
    subcategory_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let ingredient = svc.set_ingredient(name, subcategory_id)?;
    if json {
        return print_json(&ingredient);
    }
    match ingredient.subcategory_id {
        Some(id) => println!("{} is now in subcategory {id}", ingredient.name),
        None => println!("{} has no subcategory", ingredient.name),
    }
    Ok(())
}
