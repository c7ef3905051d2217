use std::path::PathBuf;

use anyhow::{Context, Result};
use hedgewatch::collect::global_variables::get_temp_path;
use hedgewatch::collect::inference::RoboflowCollect;
use hedgewatch::collect::wayback::WaybackCollect;
use hedgewatch::report::builder::ErrorResponse;
use hedgewatch::report::JsonDirStore;
use hedgewatch::{ChangeReportBuilder, GeoCoordinate, RequestContext, ScanConfig};

/// Scan one coordinate against the two configured Wayback releases.
///
/// Usage: scan_from_wayback <latitude> <longitude> [config.toml]
///
/// API_KEY, PROJECT_ID and MODEL_VERSION are read from the environment.
fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let latitude: f64 = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("51.8985")
        .parse()
        .context("latitude must be a number")?;
    let longitude: f64 = args
        .get(2)
        .map(|s| s.as_str())
        .unwrap_or("-8.4756")
        .parse()
        .context("longitude must be a number")?;

    let mut config = match args.get(3) {
        Some(path) => ScanConfig::from_file(&PathBuf::from(path))?,
        None => ScanConfig::default(),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok())?;

    println!("=== Hedge scan at ({}, {}) ===", latitude, longitude);
    println!("Model: {}", config.model_id());

    let tiles = WaybackCollect::new(&config.wayback)?;
    let inference = RoboflowCollect::new(&config.inference)?;
    let store = JsonDirStore::new(get_temp_path().join("reports"));
    let builder = ChangeReportBuilder::new(&config, Box::new(tiles), Box::new(inference), Box::new(store))?;

    let ctx = RequestContext::new();
    match builder.run(&ctx, GeoCoordinate::new(latitude, longitude)) {
        Ok(outcome) => {
            println!("Tile: {}", outcome.result.tile);
            println!("Description: {}", outcome.description);
            println!("{}", serde_json::to_string_pretty(&outcome.to_response())?);
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&e))?);
            return Err(e.into());
        }
    }

    Ok(())
}
