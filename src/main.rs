//! waf-engine - JSONL decision loop entry point
//!
//! Reads one request per line from stdin (JSON, see [`Request`]), runs it
//! through the engine and prints the decision record as JSONL on stdout.
//! On EOF the engine saves a final checkpoint and logs a statistics
//! summary. Pass a config file path as the first argument; without one
//! the built-in defaults apply (passive mode, no real upstream).

use std::io::{BufRead, Write};
use std::sync::Arc;

use adaptive_waf_core::executor::NullUpstream;
use adaptive_waf_core::scorer::HeuristicScorer;
use adaptive_waf_core::{constants, Engine, EngineConfig, HttpUpstream, Request, Upstream};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!(
        "Starting {} v{} (decision loop)...",
        constants::APP_NAME,
        constants::APP_VERSION
    );

    let config = match std::env::args().nth(1) {
        Some(path) => match EngineConfig::from_file(std::path::Path::new(&path)) {
            Ok(c) => c,
            Err(e) => {
                log::error!("cannot load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let upstream: Arc<dyn Upstream> = match std::env::var("WAF_UPSTREAM_URL") {
        Ok(url) if !url.is_empty() => {
            log::info!("forwarding to upstream {}", url);
            Arc::new(HttpUpstream::new(&url))
        }
        _ => {
            log::info!("no upstream configured, decisions are not forwarded");
            Arc::new(NullUpstream)
        }
    };

    let engine = match Engine::with_parts(config, upstream, Arc::new(HeuristicScorer::new()), None)
    {
        Ok(e) => e,
        Err(e) => {
            log::error!("engine init failed: {}", e);
            std::process::exit(1);
        }
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut malformed = 0u64;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                malformed += 1;
                log::warn!("skipping malformed request line: {}", e);
                continue;
            }
        };

        let record = engine.process(&request);
        if writeln!(out, "{}", record.to_jsonl()).is_err() {
            // downstream closed the pipe, stop cleanly
            break;
        }
    }

    match engine.save_checkpoint() {
        Ok(()) => log::info!("final checkpoint saved"),
        Err(e) => log::warn!("final checkpoint save failed: {}", e),
    }

    let stats = engine.statistics();
    log::info!(
        "shutdown: {} requests ({} malformed lines), {} states learned, \
         {} updates, exploration ratio {:.3}",
        stats.requests_processed,
        malformed,
        stats.states_learned,
        stats.total_updates,
        stats.exploration_ratio
    );
    for (action, count) in &stats.execution_counts {
        if *count > 0 {
            log::info!("  {}: {}", action, count);
        }
    }
}
