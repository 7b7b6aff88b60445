mod catalog;
mod extra;
mod helpers;
mod key;
mod menu;
mod recipe;
mod shopping;

pub(crate) use catalog::{
    cmd_catalog_add_subcategory, cmd_catalog_ingredients, cmd_catalog_set_ingredient,
    cmd_catalog_store_order,
};
pub(crate) use extra::{cmd_extra_list, cmd_extra_remove, cmd_extra_set};
pub(crate) use key::cmd_key_create;
pub(crate) use menu::{cmd_menu_add, cmd_menu_list, cmd_menu_remove};
pub(crate) use recipe::{
    cmd_recipe_delete, cmd_recipe_import, cmd_recipe_ingredient, cmd_recipe_remove_ingredient,
    cmd_recipe_save, cmd_recipe_search, cmd_recipe_show, parse_amount,
};
pub(crate) use shopping::cmd_shopping;
