use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use basket_core::models::{NewExtraIngredient, UserId};
use basket_core::service::BasketService;

use super::helpers::{exit_empty, json_error, print_json, signed_in, truncate};

pub(crate) fn cmd_extra_list(svc: &BasketService, user: Option<&UserId>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct ExtraRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let extras = signed_in(svc.list_extra_ingredients(user)?, json);
    if extras.is_empty() {
        exit_empty(json, "No extra ingredients");
    }
    if json {
        return print_json(&extras);
    }

    let rows: Vec<ExtraRow> = extras
        .iter()
        .map(|e| ExtraRow {
            name: truncate(&e.name, 35),
            quantity: e.quantity.to_string(),
            unit: e.unit.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_extra_set(
    svc: &BasketService,
    user: Option<&UserId>,
    item: &NewExtraIngredient,
    json: bool,
) -> Result<()> {
    let extra = signed_in(svc.upsert_extra_ingredient(user, item)?, json);
    if json {
        return print_json(&extra);
    }
    let unit = &extra.unit;
    println!("Extra ingredient: {} - {} {unit}", extra.name, extra.quantity);
    Ok(())
}

pub(crate) fn cmd_extra_remove(
    svc: &BasketService,
    user: Option<&UserId>,
    name: &str,
    json: bool,
) -> Result<()> {
    if signed_in(svc.remove_extra_ingredient(user, name)?, json) {
        if json {
            println!("{}", serde_json::json!({ "removed": name }));
        } else {
            println!("Removed extra ingredient {name}");
        }
    } else {
        if json {
            println!(
                "{}",
                json_error(&format!("Extra ingredient '{name}' not found"))
            );
        } else {
            eprintln!("Extra ingredient '{name}' not found");
        }
        process::exit(2);
    }
    Ok(())
}
