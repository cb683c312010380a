//! `strainer` command line: resolve a query string against a schema and an
//! endpoint definition and print the SQL.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use strainer::{Config, EndpointDefinition, InMemoryLookup, Schema, SqlScope};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Schema file (YAML or JSON).
    #[arg(long)]
    schema: PathBuf,

    /// Endpoint definition file (YAML or JSON).
    #[arg(long)]
    endpoint: PathBuf,

    /// Root entity; overrides the endpoint's `entity`.
    #[arg(long)]
    entity: Option<String>,

    /// Records used to resolve scope filter lookups.
    #[arg(long)]
    lookup: Option<PathBuf>,

    /// Query string, e.g. `filter[name]=ada&sort=-created_at`.
    query: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    let schema = Schema::from_yaml(&read(&args.schema)?)
        .with_context(|| format!("invalid schema in {}", args.schema.display()))?;
    let endpoint = EndpointDefinition::from_yaml(&read(&args.endpoint)?)
        .with_context(|| format!("invalid endpoint in {}", args.endpoint.display()))?;

    let Some(entity) = args.entity.clone().or_else(|| endpoint.entity.clone()) else {
        bail!("no root entity: pass --entity or set `entity` in the endpoint definition");
    };

    let mut resolver = endpoint
        .into_resolver_with(config)
        .context("failed to build resolver")?;
    if let Some(path) = &args.lookup {
        let records: InMemoryLookup = serde_yml::from_str(&read(path)?)
            .with_context(|| format!("invalid lookup records in {}", path.display()))?;
        resolver = resolver.with_lookup(Arc::new(records));
    }

    let mut scope = SqlScope::new(Arc::new(schema), &entity)?;
    let resolution = resolver
        .resolve_query(&args.query, &mut scope)
        .context("failed to resolve query")?;
    info!(
        filters = ?resolution.filters,
        sorts = ?resolution.sorts,
        includes = ?resolution.includes,
        "query resolved"
    );

    println!("{}", scope.to_sql()?);
    for load in scope.eager_loads() {
        match &load.columns {
            Some(columns) => println!("-- eager load {} [{}]", load.relation, columns.join(", ")),
            None => println!("-- eager load {}", load.relation),
        }
    }
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
