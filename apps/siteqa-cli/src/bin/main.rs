use std::collections::BTreeMap;
use std::env;

use siteqa_core::config::Config;
use siteqa_core::data_processor::DirectoryCorpus;
use siteqa_core::traits::ChunkSource;
use siteqa_hybrid::context::DEFAULT_SOURCE_LIMIT;
use siteqa_hybrid::{build_context, format_sources, HybridRetriever, not_found_reply, Retrieval};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: siteqa <ingest [--force]|retrieve <query> [--k N] [--json]|context <query>|chunks>";

struct Args {
    cmd: String,
    query: Option<String>,
    k: Option<usize>,
    force: bool,
    json: bool,
}

fn parse_args() -> Args {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    let mut parsed = Args { cmd, query: None, k: None, force: false, json: false };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--force" | "-f" => parsed.force = true,
            "--json" => parsed.json = true,
            "--k" | "-k" => match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                Some(k) => { parsed.k = Some(k); i += 1; }
                None => { eprintln!("Error: --k requires a number"); std::process::exit(1); }
            },
            other if !other.starts_with('-') => parsed.query = Some(other.to_string()),
            other => { eprintln!("Unknown flag: {other}"); std::process::exit(1); }
        }
        i += 1;
    }
    parsed
}

fn require_query(args: &Args) -> String {
    args.query.clone().unwrap_or_else(|| {
        eprintln!("{USAGE}");
        std::process::exit(1)
    })
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {e:#}"); e })?;
    let settings = config.settings()?;
    let args = parse_args();

    match args.cmd.as_str() {
        "ingest" => {
            let retriever = HybridRetriever::from_config(&config)?;
            retriever.rebuild_index(args.force)?;
            println!("✅ Index ready (corpus version {})", retriever.snapshot_version().unwrap_or_default());
        }
        "retrieve" => {
            let query = require_query(&args);
            let k = args.k.unwrap_or(settings.retrieval.default_top_n);
            let retriever = HybridRetriever::from_config(&config)?;
            let retrieval = retriever.retrieve_scored(&query, k);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&retrieval)?);
                return Ok(());
            }
            match retrieval {
                Retrieval::Found(scored) => {
                    println!("🔍 {} results for: \"{}\"", scored.len(), query);
                    for (i, s) in scored.iter().enumerate() {
                        let source = s.chunk.source_name().unwrap_or("?");
                        println!("\n  {}. score={:.4}  source={}", i + 1, s.score, source);
                        println!("     📝 {}", s.chunk.content);
                    }
                }
                Retrieval::Empty(reason) => println!("No results ({reason:?})"),
            }
        }
        "context" => {
            let query = require_query(&args);
            let retriever = HybridRetriever::from_config(&config)?;
            let chunks = retriever.retrieve(&query, settings.retrieval.context_top_n);
            if chunks.is_empty() {
                println!("{}", not_found_reply(&query));
                return Ok(());
            }
            println!("{}", build_context(&chunks));
            print!("{}", format_sources(&chunks, DEFAULT_SOURCE_LIMIT));
            println!();
        }
        "chunks" => {
            let corpus = DirectoryCorpus::from_settings(&settings, config.base_dir());
            let chunks = corpus.load_all_chunks()?;
            let mut per_source: BTreeMap<String, usize> = BTreeMap::new();
            for c in &chunks {
                let key = match (c.source_type(), c.source_name()) {
                    (Some(t), Some(n)) => format!("{}:{n}", t.as_str()),
                    _ => "unknown".to_string(),
                };
                *per_source.entry(key).or_insert(0) += 1;
            }
            println!("📊 {} chunks from {} sources in {}", chunks.len(), per_source.len(), corpus.dir().display());
            for (source, count) in per_source {
                println!("  {count:>5}  {source}");
            }
        }
        _ => { eprintln!("Unknown command: {}\n{USAGE}", args.cmd); std::process::exit(1); }
    }
    Ok(())
}
