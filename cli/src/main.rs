mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    cmd_catalog_add_subcategory, cmd_catalog_ingredients, cmd_catalog_set_ingredient,
    cmd_catalog_store_order, cmd_extra_list, cmd_extra_remove, cmd_extra_set, cmd_key_create,
    cmd_menu_add, cmd_menu_list, cmd_menu_remove, cmd_recipe_delete, cmd_recipe_import,
    cmd_recipe_ingredient, cmd_recipe_remove_ingredient, cmd_recipe_save, cmd_recipe_search,
    cmd_recipe_show, cmd_shopping, parse_amount,
};
use crate::config::Config;
use basket_core::models::{
    NewExtraIngredient, RecipeIngredientUpsert, RecipeSearch, RecipeUpsert, UserId,
};
use basket_core::service::BasketService;

#[derive(Parser)]
#[command(
    name = "basket",
    version,
    about = "Plan a menu from your recipes and get the shopping list"
)]
struct Cli {
    /// User to act as (e.g. an email address)
    #[arg(long, global = true, env = "BASKET_USER")]
    user: Option<String>,
    /// Database file (default: inside the data directory)
    #[arg(long, global = true, env = "BASKET_DB", value_name = "PATH")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage recipes and their ingredients
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Plan which recipes to cook
    Menu {
        #[command(subcommand)]
        command: MenuCommands,
    },
    /// Show the shopping list for everything on the menu
    Shopping {
        /// Write CSV to stdout instead of a table
        #[arg(long, conflicts_with = "json")]
        csv: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage extra items to buy alongside the menu
    Extra {
        #[command(subcommand)]
        command: ExtraCommands,
    },
    /// Manage the shared ingredient catalog and store order
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Manage API keys for the REST server
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchField {
    Name,
    Instruction,
    Ingredient,
}

impl From<SearchField> for RecipeSearch {
    fn from(field: SearchField) -> Self {
        match field {
            SearchField::Name => Self::Name,
            SearchField::Instruction => Self::Instruction,
            SearchField::Ingredient => Self::Ingredient,
        }
    }
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Search your recipes (lists all when the query is empty)
    Search {
        /// Text to look for
        #[arg(default_value = "")]
        query: String,
        /// What to match the query against
        #[arg(long, value_enum, default_value = "name")]
        by: SearchField,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredients
    Show {
        /// Recipe ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a recipe, or update it when --id is given
    Save {
        /// Existing recipe ID to update
        #[arg(long)]
        id: Option<String>,
        /// Recipe name
        #[arg(long)]
        name: String,
        /// Number of portions this recipe makes
        #[arg(short, long, default_value = "1")]
        portions: i64,
        /// Preparation instructions
        #[arg(long, default_value = "")]
        instruction: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe and its ingredients
    Delete {
        /// Recipe ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient line to a recipe, or update it when --id is given
    Ingredient {
        /// Recipe ID
        recipe_id: String,
        /// Ingredient name
        name: String,
        /// Quantity (e.g. "500", "1/2", "500 g")
        quantity: String,
        /// Unit (overrides a unit written in the quantity)
        unit: Option<String>,
        /// Existing ingredient line ID to update
        #[arg(long)]
        id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient line from a recipe
    RemoveIngredient {
        /// Recipe ID
        recipe_id: String,
        /// Ingredient line ID
        ingredient_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: PathBuf,
        /// Recipe name override (defaults to metadata title or filename)
        #[arg(long)]
        name: Option<String>,
        /// Portions override (defaults to metadata servings)
        #[arg(long)]
        portions: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MenuCommands {
    /// Put a recipe on the menu
    Add {
        /// Recipe ID
        recipe_id: String,
        /// Portions to cook (default: the recipe's portions)
        #[arg(short, long)]
        portions: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Take a recipe off the menu
    Remove {
        /// Recipe ID
        recipe_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the menu
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ExtraCommands {
    /// List extra ingredients
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an extra ingredient, or replace the one with the same name
    Set {
        /// Ingredient name
        name: String,
        /// Quantity
        quantity: f64,
        /// Unit
        #[arg(default_value = "")]
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an extra ingredient
    Remove {
        /// Ingredient name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// List known ingredients and their subcategory
    Ingredients {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show subcategories in store order
    StoreOrder {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Append a subcategory to the store order
    AddSubcategory {
        /// Subcategory name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register an ingredient and assign its subcategory
    SetIngredient {
        /// Ingredient name
        name: String,
        /// Subcategory ID (omit to clear)
        #[arg(long)]
        subcategory: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create an API key for a user
    Create {
        /// User the key signs in as
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Log to stderr so stdout stays clean for tables, JSON and CSV.
/// `BASKET_LOG` takes precedence over `RUST_LOG`.
fn init_logging(serving: bool) {
    let default = if serving { "info" } else { "warn" };
    let filter = std::env::var("BASKET_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default.to_string());

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Serve { .. }));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let user = cli
        .user
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(UserId::new);
    let user = user.as_ref();

    let svc = BasketService::new(&config.db_path)?;
    tracing::debug!(db = %config.db_path.display(), "opened database");

    match cli.command {
        Commands::Recipe { command } => match command {
            RecipeCommands::Search { query, by, json } => {
                cmd_recipe_search(&svc, user, &query, by.into(), json)
            }
            RecipeCommands::Show { id, json } => cmd_recipe_show(&svc, user, &id, json),
            RecipeCommands::Save {
                id,
                name,
                portions,
                instruction,
                json,
            } => {
                let recipe = RecipeUpsert {
                    id,
                    name,
                    portions,
                    instruction,
                };
                cmd_recipe_save(&svc, user, &recipe, json)
            }
            RecipeCommands::Delete { id, json } => cmd_recipe_delete(&svc, user, &id, json),
            RecipeCommands::Ingredient {
                recipe_id,
                name,
                quantity,
                unit,
                id,
                json,
            } => {
                let (quantity, unit) = parse_amount(&quantity, unit.as_deref())?;
                let ingredient = RecipeIngredientUpsert {
                    id,
                    recipe_id,
                    ingredient_name: name,
                    quantity,
                    unit,
                };
                cmd_recipe_ingredient(&svc, user, &ingredient, json)
            }
            RecipeCommands::RemoveIngredient {
                recipe_id,
                ingredient_id,
                json,
            } => cmd_recipe_remove_ingredient(&svc, user, &recipe_id, &ingredient_id, json),
            RecipeCommands::Import {
                file,
                name,
                portions,
                json,
            } => cmd_recipe_import(&svc, user, &file, name, portions, json),
        },
        Commands::Menu { command } => match command {
            MenuCommands::Add {
                recipe_id,
                portions,
                json,
            } => cmd_menu_add(&svc, user, &recipe_id, portions, json),
            MenuCommands::Remove { recipe_id, json } => {
                cmd_menu_remove(&svc, user, &recipe_id, json)
            }
            MenuCommands::List { json } => cmd_menu_list(&svc, user, json),
        },
        Commands::Shopping { csv, json } => cmd_shopping(&svc, user, csv, json),
        Commands::Extra { command } => match command {
            ExtraCommands::List { json } => cmd_extra_list(&svc, user, json),
            ExtraCommands::Set {
                name,
                quantity,
                unit,
                json,
            } => {
                let item = NewExtraIngredient {
                    name,
                    quantity,
                    unit,
                };
                cmd_extra_set(&svc, user, &item, json)
            }
            ExtraCommands::Remove { name, json } => cmd_extra_remove(&svc, user, &name, json),
        },
        Commands::Catalog { command } => match command {
            CatalogCommands::Ingredients { json } => cmd_catalog_ingredients(&svc, json),
            CatalogCommands::StoreOrder { json } => cmd_catalog_store_order(&svc, json),
            CatalogCommands::AddSubcategory { name, json } => {
                cmd_catalog_add_subcategory(&svc, &name, json)
            }
            CatalogCommands::SetIngredient {
                name,
                subcategory,
                json,
            } => cmd_catalog_set_ingredient(&svc, &name, subcategory, json),
        },
        Commands::Serve { port, bind } => {
            let sessions = config.load_sessions()?;
            server::start_server(svc, sessions, port, &bind).await
        }
        Commands::Key { command } => match command {
            KeyCommands::Create { user, json } => cmd_key_create(&config, &user, json),
        },
    }
}
