use std::path::PathBuf;

use anyhow::{bail, Result};
use hedgewatch::collect::global_variables::get_temp_path;
use hedgewatch::collect::inference::RoboflowCollect;
use hedgewatch::report::batch::BatchScanner;
use hedgewatch::ScanConfig;

/// Compare pre-downloaded tiles named `{version}_{column}_{row}.png`.
///
/// Usage: batch_from_folder <input_dir> [output_dir]
fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(input_dir) = args.get(1).map(PathBuf::from) else {
        bail!("usage: batch_from_folder <input_dir> [output_dir]");
    };
    let output_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| get_temp_path().join("differences"));

    let config = ScanConfig::from_env()?;
    let versions = config.version_set()?;
    let model = config.model_id();

    let inference = RoboflowCollect::new(&config.inference)?;
    let scanner = BatchScanner::new(&inference, &model, &versions, &config.tracked_class);
    let summary = scanner.run(&input_dir, &output_dir)?;

    println!("=== Batch results ===");
    for entry in &summary.processed {
        match entry.percentage_change.value() {
            Some(value) => println!("{}_{}: {:.2}% -> {:?}", entry.column, entry.row, value, entry.image_path),
            None => println!("{}_{}: undefined -> {:?}", entry.column, entry.row, entry.image_path),
        }
    }
    for ((column, row), reason) in &summary.skipped {
        println!("{}_{}: skipped ({})", column, row, reason);
    }
    Ok(())
}
