use anyhow::Result;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use basket_core::models::{ExtraIngredient, ShoppingListLine, UserId};
use basket_core::service::BasketService;
use basket_core::shopping;

use super::helpers::{exit_empty, format_quantity, print_json, signed_in, truncate};

const NOTHING_TO_BUY: &str = "Nothing to buy. Add recipes with: basket menu add <recipe-id>";

pub(crate) fn cmd_shopping(
    svc: &BasketService,
    user: Option<&UserId>,
    csv: bool,
    json: bool,
) -> Result<()> {
    let lines = signed_in(svc.shopping_list(user)?, json);

    if csv {
        return shopping::write_csv(&lines, io::stdout().lock());
    }
    if json {
        if lines.is_empty() {
            exit_empty(json, NOTHING_TO_BUY);
        }
        return print_json(&lines);
    }

    let extras = signed_in(svc.list_extra_ingredients(user)?, json);
    let names: HashMap<i64, String> = svc
        .store_order()?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();
    match render_shopping(&lines, &names, &extras) {
        Some(text) => print!("{text}"),
        None => exit_empty(json, NOTHING_TO_BUY),
    }
    Ok(())
}

/// Table of menu lines followed by the extras. `None` when both are empty.
fn render_shopping(
    lines: &[ShoppingListLine],
    subcategories: &HashMap<i64, String>,
    extras: &[ExtraIngredient],
) -> Option<String> {
    if lines.is_empty() && extras.is_empty() {
        return None;
    }

    let mut out = String::new();
    if !lines.is_empty() {
        out.push_str(&shopping_table(lines, subcategories));
        out.push('\n');
    }
    if !extras.is_empty() {
        if !lines.is_empty() {
            out.push('\n');
        }
        out.push_str("  EXTRAS:\n");
        for extra in extras {
            let unit = &extra.unit;
            let _ = writeln!(out, "    {} - {} {unit}", extra.name, extra.quantity);
        }
    }
    Some(out)
}

fn shopping_table(lines: &[ShoppingListLine], subcategories: &HashMap<i64, String>) -> String {
    #[derive(Tabled)]
    struct ShoppingRow {
        #[tabled(rename = "Aisle")]
        aisle: String,
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
    }

    let rows: Vec<ShoppingRow> = lines
        .iter()
        .map(|line| ShoppingRow {
            aisle: line
                .sub_category
                .and_then(|id| subcategories.get(&id).cloned())
                .unwrap_or_else(|| "-".to_string()),
            name: truncate(&line.name, 30),
            amount: format_quantity(line.quantity, &line.unit),
            recipe: truncate(&line.recipe, 30),
        })
        .collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn milk() -> ExtraIngredient {
        ExtraIngredient {
            name: "Milk".to_string(),
            user_id: "ana@example.com".to_string(),
            quantity: 2.5,
            unit: "l".to_string(),
        }
    }

    fn salt_line() -> ShoppingListLine {
        ShoppingListLine {
            name: "Salt".to_string(),
            quantity: Decimal::new(5, 0),
            unit: "g".to_string(),
            sub_category: Some(1),
            id: "i1".to_string(),
            recipe: "Soup".to_string(),
        }
    }

    #[test]
    fn test_render_nothing_to_buy() {
        assert!(render_shopping(&[], &HashMap::new(), &[]).is_none());
    }

    #[test]
    fn test_render_extras_without_menu() {
        let text = render_shopping(&[], &HashMap::new(), &[milk()]).unwrap();
        assert_eq!(text, "  EXTRAS:\n    Milk - 2.5 l\n");
    }

    #[test]
    fn test_render_lines_then_extras() {
        let names = HashMap::from([(1, "Spices".to_string())]);
        let text = render_shopping(&[salt_line()], &names, &[milk()]).unwrap();

        assert!(text.contains("Spices"));
        assert!(text.contains("5 g"));
        let table_end = text.find("Soup").unwrap();
        assert!(text.find("EXTRAS").unwrap() > table_end);
    }
}
