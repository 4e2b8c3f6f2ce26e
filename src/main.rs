use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::fs;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use statement_audit::{
    audit_catalog, export_results_csv, insert_reconciliation_results, insert_validation_results,
    parse_period_label, AuditEngine, EngineConfig, FinancialPeriod, FinancialTableParser, PlainTextBackend,
    SqliteStore, StatementType, Status, ValidationService, VERSION,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("statement_audit=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("extract") => run_extract(&args[2..]),
        Some("audit") => run_audit(&args[2..]),
        Some("validate") => run_validate(&args[2..]),
        Some("rules") => {
            print_rules();
            Ok(())
        }
        Some("--version") => {
            println!("statement-audit {}", VERSION);
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("statement-audit {}", VERSION);
    println!();
    println!("USAGE:");
    println!("  statement-audit extract <type> <file> --db <path> --property <id> --period <YYYY-MM> [--text]");
    println!("  statement-audit audit --db <path> --property <id> --period <YYYY-MM> [--config <json>] [--csv <out>]");
    println!("  statement-audit validate <type> --db <path> --property <id> --period <YYYY-MM> [--config <json>]");
    println!("  statement-audit rules");
    println!();
    println!("TYPES: balance_sheet, income_statement, cash_flow, rent_roll, mortgage_statement");
}

// ============================================================================
// ARGUMENTS
// ============================================================================

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn required(args: &[String], name: &str) -> Result<String> {
    flag(args, name).ok_or_else(|| anyhow!("Missing required argument {} <value>", name))
}

fn positional(args: &[String], index: usize, what: &str) -> Result<String> {
    args.get(index)
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .ok_or_else(|| anyhow!("Missing {}", what))
}

fn load_config(args: &[String]) -> Result<EngineConfig> {
    match flag(args, "--config") {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Open the database and resolve --property / --period
fn open_scope(args: &[String]) -> Result<(SqliteStore, FinancialPeriod)> {
    let store = SqliteStore::open(required(args, "--db")?)?;
    let property = required(args, "--property")?;
    let (year, month) = parse_period_label(&required(args, "--period")?)?;
    let period = store.add_period(&property, year, month)?;
    Ok((store, period))
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_extract(args: &[String]) -> Result<()> {
    let statement_type = StatementType::from_str(&positional(args, 0, "statement type")?)?;
    let file = positional(args, 1, "input file")?;
    let (mut store, period) = open_scope(args)?;

    println!("📄 Extracting {} from {}", statement_type.name(), file);
    let bytes = fs::read(&file).with_context(|| format!("Failed to read {}", file))?;

    let parser = if args.iter().any(|a| a == "--text") {
        FinancialTableParser::with_backend(Box::new(PlainTextBackend))
    } else {
        FinancialTableParser::new()
    };
    let result = parser.extract_document(&bytes, statement_type);

    let extraction = match (result.success, result.data) {
        (true, Some(data)) => data,
        _ => bail!(
            "Document could not be read: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    };

    println!("✓ {} pages, hash {}", result.page_count, &result.document_hash[..12]);
    if let Some(name) = &extraction.header().property_name {
        println!("✓ Property: {}", name);
    }

    let rows = store.replace_statement(&period.property_id, period.id, &extraction)?;
    println!("💾 Stored {} records for {} {}", rows, period.property_id, period.label());
    Ok(())
}

fn run_audit(args: &[String]) -> Result<()> {
    let (mut store, period) = open_scope(args)?;
    let config = load_config(args)?;

    println!("🔍 Auditing {} {}", period.property_id, period.label());
    let run = AuditEngine::new(&store, &config).run(&period.property_id, period.id)?;

    for r in &run.results {
        let icon = match r.status {
            Status::Pass => "✅",
            Status::Warning => "⚠️ ",
            Status::Fail => "❌",
            Status::Skip => "⏭️ ",
            Status::Info => "ℹ️ ",
        };
        println!("{} {:<9} {:<45} {}", icon, r.rule_id, r.rule_name, r.details);
    }

    insert_reconciliation_results(store.connection_mut(), &run)?;
    if let Some(path) = flag(args, "--csv") {
        let written = export_results_csv(&run, &path)?;
        println!("📊 Wrote {} rows to {}", written, path);
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", run.summary());
    Ok(())
}

fn run_validate(args: &[String]) -> Result<()> {
    let document_type = StatementType::from_str(&positional(args, 0, "document type")?)?;
    let (mut store, period) = open_scope(args)?;
    let config = load_config(args)?;

    println!("✅ Validating {} for {} {}", document_type.name(), period.property_id, period.label());
    let report = {
        let catalog = store.rule_catalog();
        ValidationService::new(&store, &catalog, &config.validation).validate(
            &period.property_id,
            period.id,
            document_type,
        )?
    };

    for r in &report.results {
        let icon = if r.passed { "✓" } else { "✗" };
        let message = r.error_message.as_deref().unwrap_or("");
        println!("  {} {:<32} [{}] {}", icon, r.rule_name, r.severity, message);
    }

    insert_validation_results(store.connection_mut(), &report)?;
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    if report.needs_review {
        println!("🚩 Needs review");
    }
    Ok(())
}

fn print_rules() {
    println!("📋 Audit catalog");
    for rule in audit_catalog() {
        println!("  {:<9} {:<22} {}", rule.id, rule.family.as_str(), rule.name);
    }
}
