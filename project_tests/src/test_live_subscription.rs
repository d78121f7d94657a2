use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use lib_chainsub::{LoggerLocal, MessageDecoder, ReconnectingSocket, Session, SessionConfig};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Soak test: subscribe to a node and report frame rates", long_about = None)]
struct Args {
    /// Node WebSocket endpoint
    #[clap(short, long, default_value = "ws://127.0.0.1:9944")]
    endpoint: String,

    /// Report interval in minutes
    #[clap(short, long, default_value_t = 1)]
    report_interval_minutes: u64,

    /// Stop after this many minutes; runs until Ctrl+C when omitted
    #[clap(short, long)]
    duration_minutes: Option<u64>,
}

#[derive(Default)]
struct Stats {
    global_timestamps: VecDeque<chrono::DateTime<Utc>>,
    kind_timestamps: HashMap<String, VecDeque<chrono::DateTime<Utc>>>,
    undecodable: u64,
}

/// Buckets frames by notification method, or by response id.
struct RateCounter {
    stats: Arc<Mutex<Stats>>,
}

impl MessageDecoder for RateCounter {
    fn decode(&self, payload: &[u8]) -> anyhow::Result<()> {
        let parsed: Result<Value, _> = serde_json::from_slice(payload);
        let mut data = self.stats.lock().map_err(|_| anyhow::anyhow!("stats lock poisoned"))?;
        let value = match parsed {
            Ok(value) => value,
            Err(e) => {
                data.undecodable += 1;
                return Err(e.into());
            }
        };

        let kind = match (value.get("method").and_then(Value::as_str), value.get("id")) {
            (Some(method), _) => method.to_string(),
            (None, Some(id)) => format!("response#{}", id),
            (None, None) => "other".to_string(),
        };

        let now = Utc::now();
        data.global_timestamps.push_back(now);
        data.kind_timestamps.entry(kind).or_default().push_back(now);
        Ok(())
    }
}

fn print_report(stats: &Mutex<Stats>) {
    let now = Utc::now();
    let one_minute_ago = now - Duration::minutes(1);

    let Ok(mut data) = stats.lock() else {
        return;
    };

    // Clean global
    while data.global_timestamps.front().is_some_and(|&t| t < one_minute_ago) {
        data.global_timestamps.pop_front();
    }
    let global_rate = data.global_timestamps.len();

    // Clean per kind and collect rates
    let mut rates: Vec<(String, usize)> = Vec::new();
    for (kind, dq) in data.kind_timestamps.iter_mut() {
        while dq.front().is_some_and(|&t| t < one_minute_ago) {
            dq.pop_front();
        }
        if !dq.is_empty() {
            rates.push((kind.clone(), dq.len()));
        }
    }

    // Sort DESC by msg/min
    rates.sort_by(|a, b| b.1.cmp(&a.1));

    let report = rates
        .iter()
        .map(|(k, r)| format!("{}: {} msg/min", k, r))
        .collect::<Vec<_>>()
        .join(", ");

    println!("\n----- 1-Minute Summary -----");
    println!("Global rate: {} msg/min", global_rate);
    println!("Kinds: {}", if report.is_empty() { "No data" } else { &report });
    println!("Undecodable so far: {}", data.undecodable);
    println!("----------------------------\n");
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let stats = Arc::new(Mutex::new(Stats::default()));

    // Clone for the reporter task
    let stats_reporter = Arc::clone(&stats);
    let report_interval_seconds = args.report_interval_minutes.max(1) * 60;
    tokio::spawn(async move {
        loop {
            sleep(std::time::Duration::from_secs(report_interval_seconds)).await;
            print_report(&stats_reporter);
        }
    });

    let config = SessionConfig {
        endpoint: args.endpoint.clone(),
        ..SessionConfig::default()
    };
    let loggers = LoggerLocal::new("soak");
    let socket = Arc::new(ReconnectingSocket::new(config.backoff, loggers.shared("connection")));
    let session = Session::new(socket, RateCounter { stats: stats.clone() }, config, loggers.shared("session"));

    let (stop_tx, stop_rx) = tokio::sync::broadcast::channel(1);
    println!("Subscribing to {}... Press Ctrl+C to stop.", args.endpoint);
    let mut session_handle = tokio::spawn(session.run(stop_rx));

    let deadline = async {
        match args.duration_minutes {
            Some(minutes) => sleep(std::time::Duration::from_secs(minutes * 60)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => { let _ = stop_tx.send(()); }
        _ = deadline => { let _ = stop_tx.send(()); }
        finished = &mut session_handle => {
            let report = finished??;
            println!("Session ended early: {:?}", report);
            return Ok(());
        }
    }

    let report = session_handle.await??;
    print_report(&stats);
    println!("Final session report: {:?}", report);
    Ok(())
}
