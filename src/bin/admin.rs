use std::env;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use sgp::{
    auth::password,
    config::AppConfig,
    db,
    seed::{seed_database, SeedAdmin},
};

const USAGE: &str = "Usage: sgp-admin seed | sgp-admin hash-password <password>";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("seed") => seed(),
        Some("hash-password") => {
            let plain = args.next().ok_or_else(|| anyhow!(USAGE))?;
            println!("{}", password::hash_password(&plain)?);
            Ok(())
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn seed() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "admin",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );

    let email = config
        .seed_admin_email
        .as_deref()
        .context("SEED_ADMIN_EMAIL must be set")?;
    let name = config.seed_admin_name.as_deref().unwrap_or("Administrador");
    let default_password = config
        .default_password
        .as_deref()
        .context("DEFAULT_PASSWORD must be set")?;

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;
    db::run_migrations(&mut conn)?;

    let report = seed_database(
        &mut conn,
        &SeedAdmin {
            name,
            email,
            password: default_password,
        },
    )?;

    if report.admin_created {
        println!("Created SUPERADMIN {email} (id {}).", report.admin_id);
    } else {
        println!("SUPERADMIN {email} already present (id {}).", report.admin_id);
    }
    println!("Inserted {} assuntos.", report.assuntos_created);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
