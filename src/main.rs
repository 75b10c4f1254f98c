// Entry point and high-level CLI flow.
//
// - Option [1] builds or loads the fact table, printing diagnostics.
// - Option [2] rebuilds it from the raw CSVs, ignoring any cached artifact.
// - Option [3] generates the KPI summary (JSON), a delivered-only view,
//   and the per-state rollup (CSV), with console previews.
// - After generating reports, the user can choose to go back to the
//   selection menu or exit.
use delivery_report::cache::FactCache;
use delivery_report::metrics::{apply_filters, compute_kpis, group_geo, OrderFilter};
use delivery_report::output;
use delivery_report::util::{format_int, format_number};
use log::error;
use std::io::{self, Write};
use std::path::Path;

const RAW_DATA_DIR: &str = "data/raw";
const PROCESSED_DATA_DIR: &str = "data/processed";

/// Read a single line of input after printing the common "Enter choice:" prompt.
///
/// The prompt is reused for both the main menu and simple numeric inputs.
fn read_choice() -> String {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Ask the user whether to go back to the report selection menu after
/// generating reports.
///
/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf).ok();
        let resp = buf.trim().to_uppercase();
        match resp.as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Handle options [1] and [2]: obtain the fact table, either through the
/// disk cache or by forcing a rebuild, and print a short summary.
fn handle_load(cache: &mut FactCache, use_cache_file: bool) {
    let raw_dir = Path::new(RAW_DATA_DIR);
    let processed_dir = Path::new(PROCESSED_DATA_DIR);
    if !use_cache_file {
        // Drop both memoized entries so the rebuild is visible everywhere.
        cache.evict(raw_dir, true);
        cache.evict(raw_dir, false);
    }
    match cache.fetch(raw_dir, processed_dir, use_cache_file) {
        Ok(facts) => {
            let delivered = facts
                .iter()
                .filter(|f| f.order_status == "delivered")
                .count();
            println!(
                "Fact table ready: {} orders ({} delivered).\n",
                format_int(facts.len() as i64),
                format_int(delivered as i64)
            );
        }
        Err(e) => {
            eprintln!("Failed to build fact table: {}\n", e);
        }
    }
}

/// Handle option [3]: compute the KPI summary and geographic rollup,
/// export both, and print previews.
fn handle_generate_reports(cache: &mut FactCache) {
    let raw_dir = Path::new(RAW_DATA_DIR);
    let processed_dir = Path::new(PROCESSED_DATA_DIR);
    let facts = match cache.fetch(raw_dir, processed_dir, true) {
        Ok(facts) => facts,
        Err(e) => {
            error!("could not obtain fact table: {}", e);
            eprintln!("Error: no fact table available ({}).\n", e);
            return;
        }
    };

    println!("Generating reports...");
    println!("Outputs saved to individual files...\n");

    let kpis = compute_kpis(&facts);
    if let Err(e) = output::write_json("kpi_summary.json", &kpis) {
        eprintln!("Write error: {}", e);
    }
    println!("Delivery KPI Summary (kpi_summary.json)");
    println!(
        "  Orders: {}  Delivered: {}  On-time rate: {}%",
        format_int(kpis.total_orders as i64),
        format_int(kpis.delivered_orders as i64),
        format_number(kpis.on_time_rate * 100.0, 2)
    );
    println!(
        "  Avg delay: {} days  Payments: {}  Freight: {}\n",
        format_number(kpis.avg_delay_days, 2),
        format_number(kpis.total_payment_value, 2),
        format_number(kpis.total_freight_value, 2)
    );

    let delivered_only = apply_filters(
        &facts,
        &OrderFilter {
            delivered_only: true,
            ..Default::default()
        },
    );
    let delivered_kpis = compute_kpis(&delivered_only);
    println!("Delivered Orders Only");
    println!(
        "  Orders: {}  On-time: {}  Avg delay: {} days\n",
        format_int(delivered_kpis.total_orders as i64),
        format_int(delivered_kpis.on_time_count as i64),
        format_number(delivered_kpis.avg_delay_days, 2)
    );

    let geo = group_geo(&facts);
    let geo_file = "state_summary.csv";
    if let Err(e) = output::write_csv(geo_file, &geo) {
        eprintln!("Write error: {}", e);
    }
    println!("Per-State Delivery Rollup");
    output::preview_table_rows(&geo, 5);
    println!("(Full table exported to {})\n", geo_file);
}

fn main() {
    env_logger::init();
    let mut cache = FactCache::new();
    loop {
        println!("Delivery Performance Report");
        println!("[1] Build or load the fact table");
        println!("[2] Rebuild the fact table (ignore cache)");
        println!("[3] Generate Reports\n");
        match read_choice().as_str() {
            "1" => {
                handle_load(&mut cache, true);
            }
            "2" => {
                handle_load(&mut cache, false);
            }
            "3" => {
                println!();
                handle_generate_reports(&mut cache);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => {
                println!("Invalid choice. Please enter 1, 2 or 3.\n");
            }
        }
    }
}
