use clap::{Parser, Subcommand};
use docmap::config::OdmConfig;
use docmap::query::{Fields, QueryBuilder, UpdateBuilder, operators};
use docmap::{OdmError, logger, types::SortKey};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docmap", version, about = "Translate model keyword arguments into native documents", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). Falls back to $DOCMAP_CONFIG, ./docmap.toml, ~/.config/docmap.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Print the native query for keyword conditions")]
    Query {
        #[arg(long)]
        model: String,
        #[arg(long, help = "JSON object of keyword conditions, e.g. '{\"age__gte\": 21}'")]
        args: String,
    },
    #[command(about = "Print the native update document")]
    Update {
        #[arg(long)]
        model: String,
        #[arg(long, help = "JSON object of attributes to $set")]
        set: Option<String>,
        #[arg(long, help = "JSON object of attributes to $inc")]
        inc: Option<String>,
        #[arg(long, value_delimiter = ',', help = "Comma-separated attributes to $unset")]
        unset: Vec<String>,
    },
    #[command(about = "Print the resolved sort specification")]
    Sort {
        #[arg(long)]
        model: String,
        #[arg(help = "Fields; prefix with - for descending", allow_hyphen_values = true)]
        fields: Vec<String>,
    },
    #[command(about = "List the operator table")]
    Operators,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = OdmConfig::discover(cli.config.as_deref())?;
    if cfg.logging.dir.is_some() {
        logger::configure(&cfg.logging)?;
    } else if std::env::var_os("DOCMAP_LOG_DIR").is_some() {
        logger::configure_from_env()?;
    }
    match cli.command {
        Commands::Query { model, args } => {
            let map = cfg.model(&model).effective_field_map();
            let query = QueryBuilder::new(&map).build(&Fields::from_json(&args)?)?;
            print_json(query.as_document())
        }
        Commands::Update { model, set, inc, unset } => {
            let map = cfg.model(&model).effective_field_map();
            let mut builder = UpdateBuilder::new(&map);
            if let Some(set) = set {
                builder = builder.set(&Fields::from_json(&set)?);
            }
            if let Some(inc) = inc {
                builder = builder.increment(&Fields::from_json(&inc)?);
            }
            if !unset.is_empty() {
                builder = builder.unset(unset.as_slice());
            }
            print_json(&builder.build()?.to_document())
        }
        Commands::Sort { model, fields } => {
            let map = cfg.model(&model).effective_field_map();
            let mut out = Vec::with_capacity(fields.len());
            for f in &fields {
                let (name, direction) = SortKey::parse_marker(f);
                out.push((map.resolve_keyword(name)?, direction.as_i32()));
            }
            print_json(&out)
        }
        Commands::Operators => {
            for op in operators::operators() {
                println!("{:<10} {:<12} {:?}", op.token, op.native, op.kind);
            }
            Ok(())
        }
    }
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        let translation = e.downcast_ref::<OdmError>().is_some_and(OdmError::is_translation_error);
        std::process::exit(if translation { 2 } else { 1 });
    }
}
