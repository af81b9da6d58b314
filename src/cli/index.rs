use cxxd::indexer::ScanReport;

pub fn print_report(report: &ScanReport) {
    println!("Indexing complete!");
    println!("  Files found: {}", report.files_found);
    println!("  Files indexed: {}/{}", report.files_completed, report.files_dispatched);
    println!(
        "  Workers: {} spawned, {} failed",
        report.workers_spawned, report.workers_failed
    );
    println!(
        "  Merged {} symbols from {} worker stores",
        report.symbols_merged, report.stores_merged
    );

    if !report.files_abandoned.is_empty() {
        println!("\n⚠️  {} files were not indexed:", report.files_abandoned.len());
        for file in &report.files_abandoned {
            println!("  - {}", file.display());
        }
    }
}
