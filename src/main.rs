use actix_web::web;
use std::env;

use catalog_lineage::config::{AppConfig, LineageConfig};
use catalog_lineage::handlers::AppState;
use catalog_lineage::{Catalog, FieldLineage};

const USAGE: &str = "Usage: catalog_lineage --cli <snapshot.json> <fqdn> [--fields|-f] [--pretty|-p]";

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    // Check if running in CLI mode
    let cli_mode = take_flag(&mut args, &["--cli"]);

    if cli_mode {
        if let Err(e) = run_cli_mode(args) {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
        Ok(())
    } else {
        run_server_mode().await
    }
}

async fn run_server_mode() -> std::io::Result<()> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = AppConfig::from_file(&config_path).map_err(std::io::Error::other)?;

    let (log_state, _log_guard) =
        catalog_lineage::logging::init_logging(&config.logging).map_err(std::io::Error::other)?;
    catalog_lineage::logging::start_log_maintenance(log_state);

    tracing::info!("Loaded configuration from {}", config_path);

    let catalog =
        Catalog::from_path(&config.catalog.snapshot_path).map_err(std::io::Error::other)?;
    tracing::info!(
        "Catalog snapshot {:?} loaded with {} tables and {} fields",
        config.catalog.snapshot_path,
        catalog.table_count(),
        catalog.field_count()
    );

    let state = web::Data::new(AppState {
        catalog,
        lineage: config.lineage.clone(),
    });

    catalog_lineage::server::start_server(
        &config.server.host,
        config.server.port,
        config.server.worker_threads,
        state,
    )
    .await
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    if let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn run_cli_mode(mut args: Vec<String>) -> anyhow::Result<()> {
    let fields_mode = take_flag(&mut args, &["--fields", "-f"]);
    let pretty = take_flag(&mut args, &["--pretty", "-p"]);

    let [snapshot, fqdn] = args.as_slice() else {
        anyhow::bail!("{}", USAGE);
    };

    let catalog = Catalog::from_path(snapshot)?;
    let config = LineageConfig::default();

    let json = if fields_mode {
        let lineage = FieldLineage::build(&catalog, fqdn, &config)?;
        if pretty {
            lineage.to_json_pretty()?
        } else {
            lineage.to_json()?
        }
    } else {
        let network = catalog_lineage::table_lineage_network(&catalog, fqdn, &config)?;
        if pretty {
            network.to_json_pretty()?
        } else {
            network.to_json()?
        }
    };
    println!("{}", json);
    Ok(())
}
