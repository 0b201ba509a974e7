//! CLI entry point: serve the gateway, or seed a fresh database.

use anyhow::Result;
use clap::{Parser, Subcommand};

use maitred::auth::store::{AuthStore, NewUser, Role};
use maitred::config::Config;
use maitred::db::Db;
use maitred::gateway;
use maitred::menu::{Category, DishFilter, DishStore, NewDish, SpiceLevel};

#[derive(Parser)]
#[command(name = "maitred", version, about = "Restaurant ordering and reservation API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Bind host (overrides MAITRED_HOST).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides MAITRED_PORT).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create an admin account and sample menu data.
    Seed {
        #[arg(long, default_value = "admin@maitred.local")]
        admin_email: String,
        #[arg(long)]
        admin_password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("maitred=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            gateway::run_gateway(config).await
        }
        Command::Seed {
            admin_email,
            admin_password,
        } => seed(&config, &admin_email, &admin_password).await,
    }
}

const SAMPLE_DISHES: &[(&str, &str, f64, Category, bool, SpiceLevel)] = &[
    (
        "Tomato Bruschetta",
        "Grilled bread, marinated tomatoes, basil and olive oil",
        6.5,
        Category::Appetizer,
        true,
        SpiceLevel::Mild,
    ),
    (
        "Paneer Tikka",
        "Char-grilled cottage cheese with peppers and mint chutney",
        9.0,
        Category::Appetizer,
        true,
        SpiceLevel::Medium,
    ),
    (
        "Chicken Biryani",
        "Fragrant basmati rice layered with spiced chicken and saffron",
        14.5,
        Category::Main,
        false,
        SpiceLevel::Hot,
    ),
    (
        "Mushroom Risotto",
        "Arborio rice, porcini, parmesan and a touch of truffle oil",
        13.0,
        Category::Main,
        true,
        SpiceLevel::Mild,
    ),
    (
        "Gulab Jamun",
        "Milk dumplings in rose-scented syrup",
        5.0,
        Category::Dessert,
        true,
        SpiceLevel::Mild,
    ),
    (
        "Mango Lassi",
        "Yogurt, ripe mango, a pinch of cardamom",
        4.0,
        Category::Beverage,
        true,
        SpiceLevel::Mild,
    ),
];

/// Insert an admin account and a starter menu, skipping anything that
/// already exists. Mirrors what a fresh deployment needs before first boot.
async fn seed(config: &Config, admin_email: &str, admin_password: &str) -> Result<()> {
    let db = Db::open(&config.db_path)?;
    let auth = AuthStore::new(db.clone())?;
    let dishes = DishStore::new(db)?;

    let password_hash = tokio::task::spawn_blocking({
        let password = admin_password.to_string();
        move || bcrypt::hash(password, bcrypt::DEFAULT_COST)
    })
    .await??;

    match auth.create_user(NewUser {
        email: admin_email.to_string(),
        password_hash,
        name: "Administrator".to_string(),
        phone: None,
        role: Role::Admin,
    })? {
        Some(_) => println!("✅ admin account created: {admin_email}"),
        None => println!("admin account already exists, skipping"),
    }

    if dishes.list(DishFilter::default())?.is_empty() {
        for (name, description, price, category, vegetarian, spice) in SAMPLE_DISHES {
            dishes.create(NewDish {
                name: (*name).to_string(),
                description: (*description).to_string(),
                price: *price,
                category: *category,
                is_vegetarian: *vegetarian,
                spice_level: *spice,
                is_available: true,
            })?;
        }
        println!("🌱 seeded {} sample dishes", SAMPLE_DISHES.len());
    } else {
        println!("menu already has dishes, skipping samples");
    }

    Ok(())
}
