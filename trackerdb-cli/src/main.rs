use clap::{Parser, Subcommand, ValueEnum};
use std::process;
use trackerdb::{
    ConnectionConfig, Database, Food, Handle, Macronutrients, Storable, Store,
};

/// Nutrition tracker CLI: manage the food database from the command line
#[derive(Parser)]
#[command(name = "trackerdb", version, about)]
struct Cli {
    /// Connection string, e.g. "db=tracker.db timeout=2 shared_cache=true"
    /// (default: $TRACKERDB_CONNECTION, then tracker.db)
    #[arg(long)]
    connection: Option<String>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Add a food
    Add {
        /// Food name
        name: String,
        /// Grams of fat
        #[arg(long, default_value_t = 0.0)]
        fat: f64,
        /// Grams of carbohydrate
        #[arg(long, default_value_t = 0.0)]
        carbohydrate: f64,
        /// Grams of fiber (part of carbohydrate)
        #[arg(long, default_value_t = 0.0)]
        fiber: f64,
        /// Grams of protein
        #[arg(long, default_value_t = 0.0)]
        protein: f64,
    },

    /// List every food
    List,

    /// Show a single food by id
    Show {
        /// Food id
        id: i64,
    },

    /// Change fields of an existing food
    Set {
        /// Food id
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        fat: Option<f64>,
        #[arg(long)]
        carbohydrate: Option<f64>,
        #[arg(long)]
        fiber: Option<f64>,
        #[arg(long)]
        protein: Option<f64>,
    },

    /// Delete a food
    Delete {
        /// Food id
        id: i64,
        /// Show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Count stored foods
    Count,

    /// Show the Food table's columns
    Schema,

    /// Drop the Food table
    Drop {
        /// Required to actually drop
        #[arg(long)]
        yes: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.connection {
        Some(s) => s.parse::<ConnectionConfig>()?,
        None => ConnectionConfig::from_env()?,
    };
    log::info!("Opening {}", config.connection_string());
    Database::init(config)?;
    let mut store = Store::global()?;

    match cli.command {
        Command::Add {
            name,
            fat,
            carbohydrate,
            fiber,
            protein,
        } => {
            let macros = Macronutrients::new(fat, carbohydrate, fiber, protein);
            let handle = store.make(Food::new(name, macros))?;
            print_output(&food_json(&store, handle)?, &cli.format)?;
        }

        Command::List => {
            let handles = store.retrieve_all::<Food>()?;
            let items = handles
                .into_iter()
                .map(|h| food_json(&store, h))
                .collect::<Result<Vec<_>, _>>()?;
            print_output(&serde_json::Value::Array(items), &cli.format)?;
        }

        Command::Show { id } => {
            let handle = find_food(&mut store, id)?;
            print_output(&food_json(&store, handle)?, &cli.format)?;
        }

        Command::Set {
            id,
            name,
            fat,
            carbohydrate,
            fiber,
            protein,
        } => {
            let handle = find_food(&mut store, id)?;
            store.edit(handle, |food: &mut Food| {
                if let Some(name) = &name {
                    food.set_name(name);
                }
                let mut macros = food.macronutrients();
                if let Some(v) = fat {
                    macros.set_fat(v);
                }
                if let Some(v) = carbohydrate {
                    macros.set_carbohydrate(v);
                }
                if let Some(v) = fiber {
                    macros.set_fiber(v);
                }
                if let Some(v) = protein {
                    macros.set_protein(v);
                }
                food.set_macronutrients(macros);
            })?;
            print_output(&food_json(&store, handle)?, &cli.format)?;
        }

        Command::Delete { id, dry_run } => {
            let handle = find_food(&mut store, id)?;
            if dry_run {
                print_output(
                    &serde_json::json!({
                        "dry_run": true,
                        "would_delete": food_json(&store, handle)?,
                    }),
                    &cli.format,
                )?;
            } else {
                store.delete_storable(handle)?;
                print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
            }
        }

        Command::Count => {
            let count = store.count_rows::<Food>()?;
            print_output(&serde_json::json!({ "count": count }), &cli.format)?;
        }

        Command::Schema => {
            let schema = store.table_schema::<Food>()?;
            print_output(&serde_json::to_value(schema)?, &cli.format)?;
        }

        Command::Drop { yes } => {
            if !yes {
                return Err("refusing to drop the Food table without --yes".into());
            }
            store.drop_table::<Food>()?;
            print_output(&serde_json::json!({ "ok": true, "dropped": "Food" }), &cli.format)?;
        }
    }

    Ok(())
}

fn find_food(store: &mut Store<'_>, id: i64) -> Result<Handle<Food>, Box<dyn std::error::Error>> {
    store
        .find::<Food>(id)?
        .ok_or_else(|| format!("Food not found: {id}").into())
}

/// A food with its calorie count and sqlite-style row text
fn food_json(store: &Store<'_>, handle: Handle<Food>) -> Result<serde_json::Value, String> {
    let food = store
        .get(handle)
        .ok_or_else(|| format!("Food {} is no longer cached", handle.id()))?;
    let mut value = serde_json::to_value(food).map_err(|e| e.to_string())?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert(
            "calories".into(),
            serde_json::json!(food.macronutrients().calories()),
        );
        map.insert("row".into(), serde_json::Value::String(food.str()));
    }
    Ok(value)
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}
