use std::path::Path;

use cxxd::store::StoreStats;

pub fn print_stats(stats: &StoreStats, db_path: &Path) {
    println!("📊 Index Statistics:");
    println!("  Index: {}", db_path.display());
    println!("  Total files: {}", stats.total_files);
    println!("  Total symbols: {}", stats.total_symbols);
    println!("  Total definitions: {}", stats.total_definitions);
    println!("  Total diagnostics: {}", stats.total_diagnostics);

    if let Some(size) = db_size(db_path) {
        println!("  Index size: {:.2} MB", size);
    }
}

fn db_size(db_path: &Path) -> Option<f64> {
    let metadata = std::fs::metadata(db_path).ok()?;
    Some(metadata.len() as f64 / (1024.0 * 1024.0))
}
