use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;

use cardbox::{
    export_csv, filter_cards, import_csv, Dimension, FsObjectStore, SearchField, SqliteStore,
};

fn db_path() -> PathBuf {
    PathBuf::from(env::var("CARDBOX_DB").unwrap_or_else(|_| "cardbox.db".to_string()))
}

fn object_store() -> FsObjectStore {
    let root = env::var("CARDBOX_STORAGE_DIR").unwrap_or_else(|_| "storage".to_string());
    let base_url =
        env::var("CARDBOX_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let secret = env::var("CARDBOX_SECRET").unwrap_or_else(|_| "dev-secret".to_string());
    FsObjectStore::new(root, base_url, secret)
}

fn open_store() -> Result<SqliteStore> {
    let path = db_path();
    SqliteStore::open(&path).map_err(|e| anyhow!("failed to open database {:?}: {}", path, e))
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(),
        Some("import") => run_import(args.get(2)),
        Some("export") => run_export(args.get(2)),
        Some("list") => run_list(args.get(2), args.get(3)),
        Some("masters") => run_masters(args.get(2)),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("📇 Cardbox - Business-Card Register");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Usage:");
    println!("  cardbox init                    create the database");
    println!("  cardbox import <file.csv>       bulk-register cards from CSV");
    println!("  cardbox export <file.csv>       export all cards to CSV");
    println!("  cardbox list [term] [field]     list cards, optionally filtered");
    println!("  cardbox masters <dimension>     list master rows for one dimension");
    println!();
    println!("Environment:");
    println!("  CARDBOX_DB           database file (default: cardbox.db)");
    println!("  CARDBOX_STORAGE_DIR  image storage directory (default: storage)");
    println!();
    println!("Web API: cargo run --bin cardbox-server --features server");
}

fn run_init() -> Result<()> {
    println!("🔧 Setting up database...");
    let _store = open_store()?;
    println!("✓ Database initialized with WAL mode: {:?}", db_path());
    Ok(())
}

fn run_import(file: Option<&String>) -> Result<()> {
    let file = file.ok_or_else(|| anyhow!("usage: cardbox import <file.csv>"))?;

    println!("📂 Importing cards from {}...", file);
    let store = open_store()?;
    let images = object_store();

    let summary = import_csv(&store, &images, std::path::Path::new(file))?;

    println!("✓ Imported: {} cards", summary.imported);
    if !summary.failed.is_empty() {
        println!("✗ Skipped {} rows:", summary.failed.len());
        for (record, reason) in &summary.failed {
            eprintln!("  row {}: {}", record, reason);
        }
    }

    Ok(())
}

fn run_export(file: Option<&String>) -> Result<()> {
    let file = file.ok_or_else(|| anyhow!("usage: cardbox export <file.csv>"))?;

    let store = open_store()?;
    let count = export_csv(&store, std::path::Path::new(file))?;
    println!("✓ Exported {} cards to {}", count, file);

    Ok(())
}

fn run_list(term: Option<&String>, field: Option<&String>) -> Result<()> {
    use cardbox::CardStore;

    let store = open_store()?;
    let rows = store
        .list_cards()
        .map_err(|e| anyhow!("failed to list cards: {}", e))?;

    let field = match field {
        Some(name) => SearchField::from_str(name)
            .ok_or_else(|| anyhow!("unknown search field '{}'", name))?,
        None => SearchField::All,
    };
    let term = term.map(String::as_str).unwrap_or("");
    let filtered = filter_cards(&rows, term, field);

    println!(
        "📇 {} cards ({} total)",
        filtered.len(),
        rows.len()
    );
    for row in &filtered {
        println!(
            "  [{}] {} | {} | {} | {} | {} {}",
            row.id,
            row.organization,
            row.representative,
            row.category,
            row.region,
            row.phone,
            row.email
        );
    }

    Ok(())
}

fn run_masters(dimension: Option<&String>) -> Result<()> {
    use cardbox::CardStore;

    let name = dimension.ok_or_else(|| {
        anyhow!("usage: cardbox masters <category|region|organization|representative>")
    })?;
    let dim = Dimension::from_str(name).ok_or_else(|| anyhow!("unknown dimension '{}'", name))?;

    let store = open_store()?;
    let masters = store
        .list_masters(dim)
        .map_err(|e| anyhow!("failed to list {}: {}", dim, e))?;

    println!("🏷️  {} rows in '{}'", masters.len(), dim);
    for m in &masters {
        println!("  [{}] {}", m.id, m.name);
    }

    Ok(())
}
