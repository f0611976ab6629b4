use std::collections::BTreeMap;

use tracing::{error, info};

use triplebind::config::{Settings, init_tracing};
use triplebind::mapper::Mapper;
use triplebind::store::TripleStore;

// Opens the configured store (restoring persisted statements) and prints
// its contents grouped by graph.
#[tokio::main]
async fn main() {
    let path = std::env::var("TRIPLEBIND_CONFIG").ok();
    let settings = match Settings::load(path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Could not read the settings: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&settings.log_filter);
    let mapper = match Mapper::open(&settings) {
        Ok(mapper) => mapper,
        Err(e) => {
            error!(error = %e, "could not open the store");
            std::process::exit(1);
        }
    };
    let store = mapper.store();
    info!(models = settings.models.len(), statements = store.len(), "store opened");

    let mut graphs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for statement in store.match_pattern(None, None, None, None) {
        graphs
            .entry(statement.graph.to_string())
            .or_default()
            .push(format!("{} {} {} .", statement.subject, statement.predicate, statement.object));
    }
    for (graph, lines) in graphs {
        println!("{graph} {{");
        for line in lines {
            println!("    {line}");
        }
        println!("}}");
    }
    if let Some(persistor) = mapper.persistor() {
        match persistor.current_superhash() {
            Some(superhash) => println!("ledger head: {superhash}"),
            None => println!("ledger is empty"),
        }
    }
    mapper.flush().await;
}
