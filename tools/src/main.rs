//! match-runner: headless match runner for the tactics core.
//!
//! Usage:
//!   match-runner --seed 12345 --rounds 10 --players 2 --data-dir ./data
//!   match-runner --ipc-mode            (JSON commands on stdin, one per line)

use anyhow::{Context, Result};
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tactics_core::{
    army::Army,
    clock::SystemClock,
    command::MatchCommand,
    config::GameConfig,
    event::EventKind,
    event_bus::{EventBus, RecordingEventBus},
    session::GameSession,
    unit::UnitDefinition,
};

const ROSTER: &[(&str, u32)] = &[
    ("infantry", 1),
    ("scout", 3),
    ("cavalry", 2),
    ("artillery", 1),
];

#[derive(serde::Serialize)]
struct IpcError {
    error: String,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let rounds = parse_arg(&args, "--rounds", 10u32);
    let players = parse_arg(&args, "--players", 2usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    if !ipc_mode {
        println!("match-runner");
        println!("  seed:      {seed}");
        println!("  rounds:    {rounds}");
        println!("  players:   {players}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = GameConfig::load(data_dir)?;
    let bus = Arc::new(RecordingEventBus::new());
    let mut session = GameSession::build_with(
        config,
        Arc::clone(&bus) as Arc<dyn EventBus>,
        Arc::new(SystemClock),
    )?;

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let unit_names = seat_players(&session, players, &mut rng)?;

    session.start()?;
    let rendering = Arc::new(AtomicBool::new(true));
    let frames = Arc::new(AtomicU64::new(0));
    let render_thread = spawn_render_consumer(&session, Arc::clone(&rendering), Arc::clone(&frames))?;

    let outcome = if ipc_mode {
        run_ipc_loop(&session)
    } else {
        autoplay(&session, &unit_names, rounds, &mut rng)
    };

    let stopped = session.stop();
    rendering.store(false, Ordering::Release);
    if render_thread.join().is_err() {
        log::error!("render consumer panicked");
    }
    outcome?;
    stopped.context("scheduler ended with a fault")?;

    if !ipc_mode {
        print_summary(&session, &bus, frames.load(Ordering::Relaxed))?;
    }
    Ok(())
}

fn seat_players(session: &GameSession, players: usize, rng: &mut Pcg64Mcg) -> Result<Vec<String>> {
    let mut unit_names = Vec::new();
    for seat in 1..=players {
        let name = format!("player-{seat}");
        let mut army = Army::new();
        for (def_name, movement) in ROSTER {
            if !rng.gen_bool(0.75) {
                continue;
            }
            let definition = Arc::new(UnitDefinition::new(*def_name, *movement)?);
            army.enlist(Arc::clone(&definition), rng.gen_range(1..=4))?;
            let unit_name = format!("{name}/{def_name}");
            session.spawn_unit(&unit_name, definition)?;
            unit_names.push(unit_name);
        }
        session
            .add_player(&name, army)
            .with_context(|| format!("cannot seat {name}"))?;
    }
    Ok(unit_names)
}

/// Stand-in for the real renderer: wakes on every render request and
/// reads the latest settled state.
fn spawn_render_consumer(
    session: &GameSession,
    rendering: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
) -> Result<thread::JoinHandle<()>> {
    let requests = session.render_requests().clone();
    let match_state = Arc::clone(session.match_state());
    let handle = thread::Builder::new()
        .name("render-consumer".into())
        .spawn(move || {
            while rendering.load(Ordering::Acquire) {
                if !requests.wait(Duration::from_millis(100)) {
                    continue;
                }
                if let Ok(snapshot) = match_state.snapshot() {
                    log::trace!(
                        "frame: round {} seat {}",
                        snapshot.round,
                        snapshot.current_player_index
                    );
                }
                frames.fetch_add(1, Ordering::Relaxed);
            }
        })?;
    Ok(handle)
}

fn autoplay(
    session: &GameSession,
    unit_names: &[String],
    rounds: u32,
    rng: &mut Pcg64Mcg,
) -> Result<()> {
    let match_state = session.match_state();
    while match_state.round() <= rounds {
        let command = next_command(session, unit_names, rng)?;
        if let Err(e) = session.apply_command(&command) {
            log::warn!("command {command:?} rejected: {e}");
        }
        thread::sleep(Duration::from_millis(2));
    }
    Ok(())
}

fn next_command(
    session: &GameSession,
    unit_names: &[String],
    rng: &mut Pcg64Mcg,
) -> Result<MatchCommand> {
    let available = session.match_state().current_action_points()?;
    let roll: f64 = rng.gen();
    let command = match (roll, unit_names.is_empty()) {
        (r, false) if r < 0.10 => MatchCommand::ApplyMoveBuff {
            unit:   pick(unit_names, rng),
            amount: rng.gen_range(1..=2),
            rounds: rng.gen_range(1..=3),
        },
        (r, false) if r < 0.18 => MatchCommand::ApplyStun {
            unit:   pick(unit_names, rng),
            rounds: 1,
        },
        (r, false) if r < 0.25 => MatchCommand::ShowStatus {
            unit: pick(unit_names, rng),
            text: "Ready!".to_string(),
        },
        (r, _) if r < 0.35 => MatchCommand::FinishTurn,
        _ => MatchCommand::SpendActionPoints {
            amount: rng.gen_range(1..=available.max(1)),
        },
    };
    Ok(command)
}

fn pick(names: &[String], rng: &mut Pcg64Mcg) -> String {
    names[rng.gen_range(0..names.len())].clone()
}

fn run_ipc_loop(session: &GameSession) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<MatchCommand>(&buffer) {
            Ok(command) => match session.apply_command(&command) {
                Ok(_) => serde_json::to_string(&session.snapshot()?)?,
                Err(e) => serde_json::to_string(&IpcError { error: e.to_string() })?,
            },
            Err(e) => serde_json::to_string(&IpcError { error: e.to_string() })?,
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn print_summary(session: &GameSession, bus: &RecordingEventBus, frames: u64) -> Result<()> {
    let snapshot = session.snapshot()?;
    let stats = session.scheduler().stats();

    println!("=== MATCH SUMMARY ===");
    println!("  final round:      {}", snapshot.match_state.round);
    let current = snapshot.match_state.current_player().map_or("-", |p| p.name.as_str());
    println!("  current player:   {current}");
    println!("  turns ended:      {}", bus.count(EventKind::EndTurn));
    println!("  rounds ended:     {}", bus.count(EventKind::EndRound));
    println!("  effects applied:  {}", bus.count(EventKind::EffectApplied));
    println!("  effects expired:  {}", bus.count(EventKind::EffectExpired));
    println!();
    println!("=== SCHEDULER ===");
    println!("  iterations:       {}", stats.iterations);
    println!("  steps:            {}", stats.steps);
    println!("  saturated:        {}", stats.saturated_iterations);
    println!("  render requests:  {}", session.render_signal().requested());
    println!("  frames consumed:  {frames}");
    println!();
    println!("=== UNITS ===");
    for unit in &snapshot.units {
        println!(
            "  {:<24} move {} {}{}",
            unit.name,
            unit.movement_range,
            if unit.stunned { "stunned " } else { "" },
            if unit.active_effects.is_empty() {
                String::new()
            } else {
                format!("({} effects)", unit.active_effects.len())
            }
        );
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
