use clap::Parser;
use scribe::cli::{Cli, Command};
use scribe::config::Settings;
use scribe::fields::{resolve, FieldKey, FieldNode};
use scribe::history::create_store;
use scribe::schema::SchemaCache;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays parseable
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;
    debug!(collections = settings.collections.len(), "Configuration loaded");

    match &cli.command {
        Command::Schema { kinds } => {
            let kinds = kinds.clone().unwrap_or_else(|| settings.generation.default_kinds.clone());
            let schema = SchemaCache::new().get_or_compile(&kinds).await;
            info!(kinds = %schema.cache_key, "Compiled schema");
            println!("{}", serde_json::to_string_pretty(&schema.document)?);
        }
        Command::Resolve { collection, path } => {
            let registry = settings.field_registry();
            let segments: Vec<&str> = path.split('.').collect();
            let found: Option<&FieldNode> = registry.collection(collection).and_then(|c| resolve(c, &segments));
            match found {
                Some(field) => println!("{}", serde_json::to_string_pretty(field)?),
                None => println!("not found"),
            }
        }
        Command::History { document, field } => {
            let key = FieldKey::parse(document.clone(), field).map_err(|e| anyhow::anyhow!(e))?;
            let store = create_store(&settings.history)?;
            store.load(&key).await?;
            match store.snapshot(&key).await {
                Some(snapshot) if !snapshot.history.is_empty() => {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?)
                }
                _ => println!("no history"),
            }
        }
        Command::FieldSchema => {
            let schema = schemars::schema_for!(scribe::fields::CollectionSchema);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}
