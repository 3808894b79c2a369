use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use rtp_api::{serve, BaseRegistration, StaticCatalog, WidgetApi};
use rtp_contracts::{EngineConfig, GameKey, STEP_MS};
use rtp_core::{ManualClock, RtpEngine, StdSampler};

const DEFAULT_BASES: [&str; 2] = ["https://wegobet.asia", "https://i88sg.com"];

fn print_usage() {
    println!("rtp-cli <command>");
    println!("commands:");
    println!("  status");
    println!("  refresh <base_url>");
    println!("  simulate <base_url> <seed> [steps] [snapshot_path]");
    println!("    deterministic fast-forward; persists the snapshot file");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("snapshot path comes from RTP_SNAPSHOT_PATH (default rtp_state.json)");
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_seed(value: Option<&String>) -> Result<u64, String> {
    let raw = value.ok_or_else(|| "missing seed".to_string())?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid seed: {raw}"))
}

fn default_snapshot_path() -> String {
    env::var("RTP_SNAPSHOT_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "rtp_state.json".to_string())
}

fn parse_snapshot_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_snapshot_path)
}

fn base_id_for(base_url: &str) -> String {
    base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn production_api() -> WidgetApi {
    let mut api = WidgetApi::new(
        RtpEngine::from_config(EngineConfig::default()),
        Box::new(StaticCatalog::default()),
    );
    api.attach_snapshot_store(default_snapshot_path());
    api
}

fn run_refresh(args: &[String]) -> Result<(), String> {
    let base_url = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing base_url".to_string())?;

    let mut api = production_api();
    let report = api
        .refresh(&base_url)
        .map_err(|err| format!("refresh failed: {err}"))?;

    println!("base={} updated={}", report.base_url, report.updated);
    for game in &report.games {
        match game.rtp {
            Some(rtp) => println!("  {}|{} rtp={rtp:.2}", game.game.provider_code, game.game.code),
            None => println!("  {}|{} rtp=null", game.game.provider_code, game.game.code),
        }
    }
    if let Some(err) = api.last_persistence_error() {
        eprintln!("warning: snapshot not persisted: {err}");
    }
    Ok(())
}

fn run_simulation(args: &[String]) -> Result<(), String> {
    let base_url = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing base_url".to_string())?;
    let seed = parse_seed(args.get(3))?;
    let steps = args
        .get(4)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid steps: {value}"))
        })
        .transpose()?
        .unwrap_or(20);
    let snapshot_path = parse_snapshot_path(args.get(5));

    let clock = Arc::new(ManualClock::new(0));
    let mut config = EngineConfig::default();
    config.seed = seed;
    let engine = RtpEngine::with_parts(
        config,
        clock.clone(),
        Box::new(StdSampler::seed_from_u64(seed)),
    );
    let mut api = WidgetApi::new(engine, Box::new(StaticCatalog::default()));
    api.attach_snapshot_store(&snapshot_path);

    api.refresh(&base_url)
        .map_err(|err| format!("seeding refresh failed: {err}"))?;
    let mut report = None;
    for _ in 0..steps {
        clock.advance(STEP_MS);
        report = Some(
            api.refresh(&base_url)
                .map_err(|err| format!("refresh failed: {err}"))?,
        );
    }

    if let Some(report) = report {
        println!(
            "simulated {} steps over {} games (seed {seed})",
            steps,
            report.games.len()
        );
        for game in &report.games {
            let key = GameKey::for_game(&game.game);
            if let Some(state) = api.engine().peek(&base_url, &key) {
                println!("  {key} {state}");
            }
        }
    }
    println!("snapshot written to {snapshot_path}");
    Ok(())
}

fn run_status() {
    let api = production_api();
    let config = api.engine().config();
    println!(
        "step_ms={} max_replay_steps={} seed={} namespaces={}",
        config.step_ms,
        config.max_replay_steps,
        config.seed,
        api.engine().namespace_count()
    );
    for base in DEFAULT_BASES {
        println!("  {base}: {} entities", api.engine().namespace_len(base));
    }
    match api.last_persistence_error() {
        Some(err) => println!("snapshot: degraded ({err})"),
        None => println!("snapshot: ok ({})", default_snapshot_path()),
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("status") => {
            run_status();
        }
        Some("refresh") => {
            if let Err(err) = run_refresh(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("simulate") => {
            if let Err(err) = run_simulation(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                let api = production_api();
                let bases = DEFAULT_BASES
                    .iter()
                    .map(|base| BaseRegistration::new(base_id_for(base), *base))
                    .collect();
                println!("serving rtp widget api on http://{addr}");
                if let Err(err) = serve(addr, api, bases).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        _ => {
            print_usage();
        }
    }
}
