use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};

use caselaw_agents::engine::{build_snapshot, Snapshot};
use caselaw_agents::{Engine, QueryEvent};
use caselaw_cli::RemoteGenerator;
use caselaw_core::config::{Config, Settings};
use caselaw_core::logging::init_tracing;
use caselaw_core::store::DocumentStore;
use caselaw_core::types::{Query, Turn};
use caselaw_index::{lookup, PrecedentLookup};

const USAGE: &str = "Usage: caselaw <index [--rebuild] | search \"<query>\" [--limit N] | lookup \"<query>\" [--limit N] | ask \"<query>\" | chat>";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

fn spinner(msg: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(msg.to_string());
    Ok(pb)
}

async fn load_snapshot(settings: &Settings, base_dir: &Path, rebuild: bool) -> anyhow::Result<Snapshot> {
    let pb = spinner(if rebuild { "Rebuilding index..." } else { "Loading index..." })?;
    let (settings, base_dir) = (settings.clone(), base_dir.to_path_buf());
    let snapshot = tokio::task::spawn_blocking(move || build_snapshot(&settings, &base_dir, rebuild)).await??;
    pb.finish_and_clear();
    Ok(snapshot)
}

async fn cmd_index(settings: &Settings, base_dir: &Path, args: &[String]) -> anyhow::Result<()> {
    let rebuild = args.iter().any(|a| a == "--rebuild");
    let snapshot = load_snapshot(settings, base_dir, rebuild).await?;
    println!("📚 Case law index\n=================");
    println!("Documents: {} ({} rulings, {} precedents)", snapshot.corpus.len(), snapshot.corpus.boundary(), snapshot.corpus.len() - snapshot.corpus.boundary());
    println!("Features:  {}", snapshot.index.n_features());
    println!("Source:    {:?}", snapshot.provenance);
    println!("Cache:     {}", settings.data.cache(base_dir).display());
    for p in &snapshot.partitions {
        println!("  worker {} [{}] records {}..{} ({})", p.worker_id, p.source, p.start, p.end, p.len());
    }
    Ok(())
}

/// Query text plus an optional `--limit N` / `-n N`.
fn query_and_limit(args: &[String], default_limit: usize) -> anyhow::Result<(String, usize)> {
    let mut query_text = None;
    let mut limit = default_limit;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" | "-n" => {
                limit = args.get(i + 1).and_then(|v| v.parse().ok()).ok_or_else(|| anyhow::anyhow!("--limit requires a number"))?;
                i += 1;
            }
            other => query_text = Some(other.to_string()),
        }
        i += 1;
    }
    let query_text = query_text.ok_or_else(|| anyhow::anyhow!("{USAGE}"))?;
    Ok((query_text, limit))
}

async fn cmd_search(settings: &Settings, base_dir: &Path, args: &[String]) -> anyhow::Result<()> {
    let (query_text, limit) = query_and_limit(args, settings.retrieval.top_k)?;

    let snapshot = load_snapshot(settings, base_dir, false).await?;
    println!("🔍 Query: {query_text}");
    for (p, hits) in snapshot.retrieve(&query_text, limit)? {
        println!("\nWorker {} [{}] records {}..{}: {} hits", p.worker_id, p.source, p.start, p.end, hits.len());
        for (rank, hit) in hits.iter().enumerate() {
            let Some(record) = snapshot.corpus.get(hit.doc) else { continue };
            let snippet: String = record.raw_text.chars().take(100).collect();
            println!("  {}. score={:.4}  id={}", rank + 1, hit.score, record.display_id(hit.doc));
            println!("     📝 {snippet}");
        }
    }
    Ok(())
}

async fn cmd_lookup(settings: &Settings, base_dir: &Path, args: &[String]) -> anyhow::Result<()> {
    let (query_text, limit) = query_and_limit(args, settings.lookup.top_k)?;
    let (rulings, precedents) = (settings.data.rulings(base_dir), settings.data.precedents(base_dir));
    let corpus = tokio::task::spawn_blocking(move || DocumentStore::new().load(&rulings, &precedents)).await??;
    let hits = PrecedentLookup::new()?.find(&query_text, &corpus, limit, settings.lookup.min_score);

    println!("🔎 Lookup: {query_text}");
    if hits.is_empty() {
        println!("No case matched (minimum score {}).", settings.lookup.min_score);
    }
    for (rank, hit) in hits.iter().enumerate() {
        let Some(record) = corpus.get(hit.doc) else { continue };
        let matched: Vec<String> = hit.matched.iter().map(|(field, score)| format!("{field} {score:.0}")).collect();
        println!("  {}. score={:.1}  {}", rank + 1, hit.score, lookup::title(record));
        println!("     matched: {}", matched.join(", "));
    }
    Ok(())
}

/// Run one request, printing events as they arrive. Ctrl-C cancels it.
async fn run_query(engine: &Arc<Engine>, query: Query) -> anyhow::Result<Option<String>> {
    let mut handle = engine.query(query);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut answer = None;
    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("\n⏹  Cancelling request...");
                handle.cancel();
            }
            event = handle.next_event() => match event {
                None => break,
                Some(QueryEvent::WorkerDone { worker_id, text }) => println!("✅ Worker {worker_id} done ({} chars)", text.chars().count()),
                Some(QueryEvent::WorkerFailed { worker_id, reason }) => println!("⚠️  Worker {worker_id} failed: {reason}"),
                Some(QueryEvent::Final { text, omitted }) => {
                    println!("\n{text}");
                    if !omitted.is_empty() {
                        let ids: Vec<String> = omitted.iter().map(|(id, reason)| format!("worker {id} ({reason})")).collect();
                        println!("\n(omitted: {})", ids.join(", "));
                    }
                    answer = Some(text);
                }
                Some(QueryEvent::Error { detail }) => eprintln!("❌ {detail}"),
            }
        }
    }
    Ok(answer)
}

async fn open_engine(settings: &Settings, base_dir: &Path) -> anyhow::Result<Arc<Engine>> {
    let generator = Arc::new(RemoteGenerator::from_settings(&settings.generation)?);
    let engine = Arc::new(Engine::new(settings.clone(), base_dir, generator));
    let pb = spinner("Loading index...")?;
    engine.snapshot().await?;
    pb.finish_and_clear();
    Ok(engine)
}

async fn cmd_ask(settings: &Settings, base_dir: &Path, args: &[String]) -> anyhow::Result<()> {
    let query_text = args.first().cloned().ok_or_else(|| anyhow::anyhow!("{USAGE}"))?;
    let engine = open_engine(settings, base_dir).await?;
    if run_query(&engine, Query::without_context(query_text)).await?.is_none() {
        anyhow::bail!("no answer was produced");
    }
    Ok(())
}

/// Interactive session; earlier turns are kept in memory and sent as context.
async fn cmd_chat(settings: &Settings, base_dir: &Path) -> anyhow::Result<()> {
    let engine = open_engine(settings, base_dir).await?;
    let max_turns = settings.orchestrator.max_context_turns;
    let mut turns: Vec<Turn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("💬 Ask about customs case law. Empty line or 'exit' quits.");
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else { break };
        let text = line.trim();
        if text.is_empty() || text == "exit" { break; }
        if let Some(answer) = run_query(&engine, Query::new(text, turns.clone(), max_turns)).await? {
            turns.push(Turn { user: text.to_string(), assistant: answer });
            if turns.len() > max_turns { turns.remove(0); }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = match env::var("CASELAW_CONFIG_DIR") {
        Ok(dir) => Config::load_from(Path::new(&dir)),
        Err(_) => Config::load(),
    }
    .map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let base_dir = config.base_dir();
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "index" => cmd_index(&settings, base_dir, &args).await,
        "search" => cmd_search(&settings, base_dir, &args).await,
        "lookup" => cmd_lookup(&settings, base_dir, &args).await,
        "ask" => cmd_ask(&settings, base_dir, &args).await,
        "chat" => cmd_chat(&settings, base_dir).await,
        _ => { eprintln!("Unknown command: {}\n{USAGE}", cmd); std::process::exit(1); }
    }
}
