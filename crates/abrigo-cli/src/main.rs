use std::env;
use std::net::SocketAddr;

use abrigo_api::ReliefApi;
use chrono::Utc;
use contracts::{EquityReport, NewBeneficiary, NewStockItem, PolicyConfig};
use serde::Deserialize;

fn print_usage() {
    println!("abrigo-cli <command>");
    println!("commands:");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  init [sqlite_path]");
    println!("    creates the database, the administrative institution and the item catalog");
    println!("  on-hand <item_id> [sqlite_path]");
    println!("  import-beneficiaries <csv_path> [sqlite_path]");
    println!("    csv headers: national_id,name,age,address,contact,household_size,");
    println!("                 needs,observations,zone,reported_losses");
    println!("  equity-report [window_days] [sqlite_path]");
    println!("  policy");
    println!("    prints the active distribution policy as json");
    println!();
    println!("environment:");
    println!("  ABRIGO_SQLITE_PATH   default sqlite database path");
    println!("  ABRIGO_POLICY_PATH   json file overriding the built-in policy table");
}

fn default_sqlite_path() -> String {
    env::var("ABRIGO_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "abrigo.sqlite".to_string())
}

fn sqlite_path_arg(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn load_policy() -> Result<PolicyConfig, String> {
    let Ok(path) = env::var("ABRIGO_POLICY_PATH") else {
        return Ok(PolicyConfig::default());
    };
    let raw = std::fs::read_to_string(&path)
        .map_err(|err| format!("failed to read policy file {path}: {err}"))?;
    serde_json::from_str(&raw).map_err(|err| format!("invalid policy file {path}: {err}"))
}

fn open_api(sqlite_path: &str) -> Result<ReliefApi, String> {
    let mut api = ReliefApi::new(load_policy()?);
    api.attach_sqlite_store(sqlite_path)
        .map_err(|err| format!("failed to open sqlite store {sqlite_path}: {err}"))?;
    Ok(api)
}

/// Seeds the catalog the relief network starts from: staple food, hygiene,
/// clothing and furniture items matching the default policy table.
fn seed_catalog(api: &mut ReliefApi) -> Result<usize, String> {
    let items: [(&str, &str, &str, &str); 14] = [
        ("Rice", "kg", "food", "White rice"),
        ("Beans", "kg", "food", "Red beans"),
        ("Water", "litre", "food", "Bottled drinking water"),
        ("Oil", "litre", "food", "Vegetable oil"),
        ("Sugar", "kg", "food", "White sugar"),
        ("Soap", "unit", "hygiene", "Laundry soap bar"),
        ("Toothpaste", "unit", "hygiene", "Toothpaste tube"),
        ("Shampoo", "unit", "hygiene", "Shampoo bottle"),
        ("Shirt", "unit", "clothing", "Cotton shirt"),
        ("Trousers", "unit", "clothing", "Denim trousers"),
        ("Shoes", "pair", "clothing", "Assorted shoes"),
        ("Mattress", "unit", "furniture", "Single mattress"),
        ("Blanket", "unit", "furniture", "Wool blanket"),
        ("Sheet", "unit", "furniture", "Bed sheet"),
    ];

    let mut created = 0;
    for (name, unit, category, description) in items {
        match api.add_item(
            &NewStockItem {
                name: name.to_string(),
                description: Some(description.to_string()),
                unit: unit.to_string(),
                category: Some(category.to_string()),
            },
            Utc::now(),
        ) {
            Ok(_) => created += 1,
            // Re-running init against an existing database is fine.
            Err(abrigo_api::RequestError::Distribution(
                contracts::DistributionError::DuplicateItemName(_),
            )) => {}
            Err(err) => return Err(format!("failed to seed item {name}: {err}")),
        }
    }
    Ok(created)
}

fn run_init(args: &[String]) -> Result<(), String> {
    let sqlite_path = sqlite_path_arg(args.get(2));
    let mut api = open_api(&sqlite_path)?;

    let has_administrative = api
        .network()
        .registry
        .institutions()
        .any(|institution| institution.administrative);
    if !has_administrative {
        let id = api
            .bootstrap_administrative(
                "Civil Protection",
                "admin",
                "admin@abrigo.local",
                "Duty Officer",
                Utc::now(),
            )
            .map_err(|err| format!("failed to create administrative institution: {err}"))?;
        println!("created administrative institution id={id}");
    }

    let created = seed_catalog(&mut api)?;
    println!("initialized {sqlite_path}: {created} catalog item(s) created");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct BeneficiaryRow {
    national_id: String,
    name: String,
    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    household_size: Option<u32>,
    #[serde(default)]
    needs: Option<String>,
    #[serde(default)]
    observations: Option<String>,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    reported_losses: Option<String>,
}

/// Bulk import from a census-style spreadsheet export. Rows whose national
/// id is already registered are skipped, not overwritten.
fn run_import_beneficiaries(args: &[String]) -> Result<(), String> {
    let csv_path = args
        .get(2)
        .ok_or_else(|| "missing csv_path".to_string())?;
    let sqlite_path = sqlite_path_arg(args.get(3));
    let mut api = open_api(&sqlite_path)?;

    let importer = api
        .network()
        .registry
        .institutions()
        .find(|institution| institution.administrative)
        .map(|institution| institution.id);

    let mut reader = csv::Reader::from_path(csv_path)
        .map_err(|err| format!("failed to open {csv_path}: {err}"))?;

    let mut imported = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for record in reader.deserialize::<BeneficiaryRow>() {
        let row = match record {
            Ok(row) => row,
            Err(err) => {
                eprintln!("skipping malformed row: {err}");
                failed += 1;
                continue;
            }
        };
        let new = NewBeneficiary {
            national_id: row.national_id,
            name: row.name,
            age: row.age,
            address: row.address,
            contact: row.contact,
            household_size: row.household_size,
            needs: row.needs,
            observations: row.observations,
            zone: row.zone,
            reported_losses: row.reported_losses,
        };
        match api.register_beneficiary(&new, importer, Utc::now()) {
            Ok(_) => imported += 1,
            Err(abrigo_api::RequestError::Distribution(
                contracts::DistributionError::DuplicateNationalId { .. },
            )) => skipped += 1,
            Err(err) => {
                eprintln!("row {} rejected: {err}", new.national_id);
                failed += 1;
            }
        }
    }

    println!("imported {imported} beneficiar{} ({skipped} duplicate(s) skipped, {failed} rejected)",
        if imported == 1 { "y" } else { "ies" });
    Ok(())
}

fn run_on_hand(args: &[String]) -> Result<(), String> {
    let item_id = args
        .get(2)
        .ok_or_else(|| "missing item_id".to_string())?
        .parse::<i64>()
        .map_err(|_| "invalid item_id".to_string())?;
    let sqlite_path = sqlite_path_arg(args.get(3));
    let api = open_api(&sqlite_path)?;

    let on_hand = api
        .on_hand(item_id, None)
        .map_err(|err| err.to_string())?;
    println!("item {item_id}: {on_hand} on hand");
    Ok(())
}

fn print_equity_report(report: &EquityReport) {
    println!(
        "coverage: {}% ({} of {} beneficiaries served in {} days)",
        report.coverage_percent,
        report.beneficiaries_served,
        report.total_beneficiaries,
        report.window_days
    );
    for zone in &report.by_zone {
        println!("  zone {}: {} hand-out(s)", zone.zone, zone.exit_count);
    }
    if !report.top_served.is_empty() {
        println!("most served:");
        for served in &report.top_served {
            println!("  {} ({}): {}", served.name, served.national_id, served.exit_count);
        }
    }
    if !report.least_served.is_empty() {
        println!("least served:");
        for served in &report.least_served {
            println!("  {} ({}): {}", served.name, served.national_id, served.exit_count);
        }
    }
}

fn run_equity_report(args: &[String]) -> Result<(), String> {
    let window_days = args
        .get(2)
        .map(|value| {
            value
                .parse::<u32>()
                .map_err(|_| format!("invalid window_days: {value}"))
        })
        .transpose()?
        .unwrap_or(30);
    let sqlite_path = sqlite_path_arg(args.get(3));
    let api = open_api(&sqlite_path)?;

    let report = api.equity_report(window_days, 10, Utc::now());
    print_equity_report(&report);
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                let sqlite_path = default_sqlite_path();
                let api = match open_api(&sqlite_path) {
                    Ok(api) => api,
                    Err(err) => {
                        eprintln!("error: {err}");
                        std::process::exit(1);
                    }
                };
                tracing::info!(%addr, sqlite = %sqlite_path, "serving relief api");
                if let Err(err) = abrigo_api::serve(addr, api).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("init") => {
            if let Err(err) = run_init(&args) {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("on-hand") => {
            if let Err(err) = run_on_hand(&args) {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("import-beneficiaries") => {
            if let Err(err) = run_import_beneficiaries(&args) {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("equity-report") => {
            if let Err(err) = run_equity_report(&args) {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("policy") => match load_policy() {
            Ok(policy) => match serde_json::to_string_pretty(&policy) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(1);
                }
            },
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        },
        Some("help") | None => print_usage(),
        Some(other) => {
            eprintln!("unknown command: {other}");
            print_usage();
            std::process::exit(2);
        }
    }
}
