use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use basket_core::models::UserId;
use basket_core::service::BasketService;

use super::helpers::{exit_empty, print_json, signed_in, truncate};

/// Plan a recipe. Without `portions` the recipe's own portion count is used.
pub(crate) fn cmd_menu_add(
    svc: &BasketService,
    user: Option<&UserId>,
    recipe_id: &str,
    portions: Option<i64>,
    json: bool,
) -> Result<()> {
    let portions = match portions {
        Some(p) => p,
        None => match signed_in(svc.get_recipe(user, recipe_id)?, json) {
            Some(detail) => detail.recipe.portions,
            None => bail!("Recipe {recipe_id} not found"),
        },
    };

    let entry = signed_in(svc.add_to_menu(user, recipe_id, portions)?, json);
    if json {
        return print_json(&entry);
    }
    println!("Added recipe {recipe_id} to the menu ({portions} portions)");
    Ok(())
}

pub(crate) fn cmd_menu_remove(
    svc: &BasketService,
    user: Option<&UserId>,
    recipe_id: &str,
    json: bool,
) -> Result<()> {
    signed_in(svc.remove_from_menu(user, recipe_id)?, json);
    if json {
        println!("{}", serde_json::json!({ "removed": recipe_id }));
    } else {
        println!("Removed recipe {recipe_id} from the menu");
    }
    Ok(())
}

pub(crate) fn cmd_menu_list(svc: &BasketService, user: Option<&UserId>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct MenuRow {
        #[tabled(rename = "Recipe ID")]
        recipe_id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Portions")]
        portions: i64,
        #[tabled(rename = "Added")]
        added: String,
    }

    let menu = signed_in(svc.list_menu(user)?, json);
    if menu.is_empty() {
        exit_empty(json, "The menu is empty");
    }

    if json {
        return print_json(&menu);
    }

    let rows: Vec<MenuRow> = menu
        .iter()
        .map(|item| MenuRow {
            recipe_id: item.entry.recipe_id.clone(),
            name: truncate(&item.recipe.name, 40),
            portions: item.entry.portions,
            // RFC 3339; the date part is enough here
            added: item.entry.created_at.chars().take(10).collect(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
