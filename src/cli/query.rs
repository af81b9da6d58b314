use cxxd::indexer::{DiagnosticReport, Location};

pub fn print_references(locations: &[Location]) {
    if locations.is_empty() {
        println!("No references found");
        return;
    }

    println!("Found {} references:", locations.len());
    for location in locations {
        print_location(location);
    }
}

pub fn print_definition(location: Option<&Location>) {
    match location {
        Some(location) => print_location(location),
        None => println!("No definition found"),
    }
}

pub fn print_diagnostics(reports: &[DiagnosticReport]) {
    if reports.is_empty() {
        println!("No diagnostics");
        return;
    }

    for report in reports {
        let diagnostic = &report.diagnostic;
        println!(
            "{}:{}:{}: {}: {}",
            diagnostic.file,
            diagnostic.line,
            diagnostic.column,
            diagnostic.severity.as_str(),
            diagnostic.message
        );
        for detail in &report.details {
            println!(
                "  {}:{}:{}: {}: {}",
                detail.file,
                detail.line,
                detail.column,
                detail.severity.as_str(),
                detail.message
            );
        }
    }
}

fn print_location(location: &Location) {
    println!(
        "  {}:{}:{}  {}",
        location.file,
        location.line,
        location.column,
        location.context.trim()
    );
}
