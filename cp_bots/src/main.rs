//! Bots that play a whole game of Coup, against a relay server or in
//! process.

use std::{
    fs::File,
    io::BufWriter,
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
    thread,
};

use anyhow::{Error, anyhow, bail};
use ctrlc::set_handler;
use log::{error, info, warn};
use pico_args::Arguments;

use coup::{
    Agent, Client, ExitHandle, GameSummary, MAX_PLAYERS, MIN_PLAYERS, ROOT, Table, server::DEFAULT_BIND,
};

const HELP: &str = "\
Play a game of Coup with bots

USAGE:
  cp_bots [OPTIONS]

OPTIONS:
  --server      HOST:PORT   Relay server address  [default: localhost:12345]
  --players     N           Number of bots, 2 to 6  [default: 4]
  --agent       KIND        random or priority  [default: priority]
  --seed        N           Seed for the shuffle and the bots
  --transcript  PATH        Write the game history as JSON lines

FLAGS:
  --local                   Play in process without a server
  -h, --help                Print help information
";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AgentKind {
    Random,
    Priority,
}

impl AgentKind {
    fn build(self, seed: Option<u64>) -> Agent {
        match self {
            Self::Random => Agent::random(seed),
            Self::Priority => Agent::priority(seed),
        }
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown agent `{other}`")),
        }
    }
}

struct Args {
    server: String,
    players: usize,
    agent: AgentKind,
    seed: Option<u64>,
    transcript: Option<String>,
    local: bool,
}

fn main() -> Result<(), Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        server: pargs
            .opt_value_from_str("--server")?
            .unwrap_or_else(|| DEFAULT_BIND.to_string()),
        players: pargs.opt_value_from_str("--players")?.unwrap_or(4),
        agent: pargs
            .opt_value_from_str("--agent")?
            .unwrap_or(AgentKind::Priority),
        seed: pargs.opt_value_from_str("--seed")?,
        transcript: pargs.opt_value_from_str("--transcript")?,
        local: pargs.contains("--local"),
    };
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&args.players) {
        bail!(
            "--players must be between {MIN_PLAYERS} and {MAX_PLAYERS}, got {}",
            args.players
        );
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    // Catching signals for exit. Connected bots leave their game first.
    let leaving: Arc<Mutex<Vec<ExitHandle>>> = Arc::default();
    let on_signal = Arc::clone(&leaving);
    set_handler(move || {
        let handles = on_signal.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in handles.iter() {
            if let Err(error) = handle.leave() {
                warn!("Failed to leave the game: {error}");
            }
        }
        std::process::exit(0);
    })?;

    let summary = if args.local {
        play_local(&args)?
    } else {
        play_remote(&args, &leaving)?
    };

    match summary.winner {
        Some(winner) => println!("#{winner} wins after {} rounds", summary.rounds),
        None => println!("No winner after {} rounds", summary.rounds),
    }
    if let Some(path) = &args.transcript {
        summary.history.write_json_lines(BufWriter::new(File::create(path)?))?;
        info!("Wrote {} entries to {path}", summary.history.len());
    }
    Ok(())
}

fn agents(args: &Args) -> Vec<Agent> {
    (0..args.players)
        .map(|seat| args.agent.build(args.seed.map(|seed| seed.wrapping_add(seat as u64))))
        .collect()
}

fn play_local(args: &Args) -> Result<GameSummary, Error> {
    info!("Playing {} bots in process", args.players);
    let mut table = Table::new(agents(args), args.seed)?;
    Ok(table.run()?)
}

fn play_remote(args: &Args, leaving: &Mutex<Vec<ExitHandle>>) -> Result<GameSummary, Error> {
    let addr: SocketAddr = args
        .server
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("{} doesn't resolve", args.server))?;

    // Root has to be the first to connect, so connect one at a time.
    let mut clients = Vec::with_capacity(args.players);
    for _ in 0..args.players {
        clients.push(Client::connect(&addr)?);
    }
    if !clients.iter().any(|client| client.id() == ROOT) {
        bail!("{addr} already has participants; start the bots against a fresh server");
    }
    info!("Connected {} bots to {addr}", clients.len());
    leaving
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .extend(clients.iter().map(Client::exit_handle));

    let players = args.players;
    let seed = args.seed;
    let handles: Vec<_> = clients
        .into_iter()
        .zip(agents(args))
        .map(|(mut client, agent)| {
            thread::Builder::new()
                .name(format!("bot-{}", client.id()))
                .spawn(move || {
                    let id = client.id();
                    let result = client.play(agent, players, seed);
                    if let Err(error) = &result {
                        error!("#{id}: {error}");
                    }
                    if let Err(error) = client.close() {
                        warn!("#{id}: failed to close: {error}");
                    }
                    (id, result)
                })
        })
        .collect::<Result<_, _>>()?;

    let mut root_summary = None;
    for handle in handles {
        let (id, result) = handle
            .join()
            .map_err(|_| anyhow!("a bot thread panicked"))?;
        let summary = result?;
        if id == ROOT {
            root_summary = Some(summary);
        }
    }
    root_summary.ok_or_else(|| anyhow!("root never reported"))
}
