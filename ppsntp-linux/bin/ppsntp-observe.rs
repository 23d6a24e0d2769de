use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use ppsntp_linux::{
    config::Config,
    observer::{read_state, ObservableState},
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Show the state of a running ppsntp", long_about = None)]
struct Args {
    /// Configuration file of the daemon, to find its observation socket
    #[clap(long = "config", short = 'c', conflicts_with = "socket")]
    config: Option<PathBuf>,

    /// Observation socket of the daemon
    #[clap(long, short = 's')]
    socket: Option<PathBuf>,

    /// Print the raw JSON document
    #[clap(long)]
    json: bool,
}

fn socket_path(args: &Args) -> Result<PathBuf, String> {
    if let Some(socket) = &args.socket {
        return Ok(socket.clone());
    }

    let config = match &args.config {
        Some(path) => Config::from_file(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };

    config.observation_path.ok_or_else(|| {
        "An observation socket path must be given with --socket or configured using the \
         observation-path option"
            .to_owned()
    })
}

fn print_summary(state: &ObservableState) {
    let capture = &state.capture;

    println!("ppsntp v{}, up {:.0}s", state.program.version, state.program.uptime_seconds);
    println!(
        "fudge      : {}{}",
        capture.fudge,
        if capture.calibrating { " (calibrating)" } else { "" }
    );
    println!("pulses     : {}", capture.pulses);
    println!("published  : {}", capture.published);
    println!("retrieved  : {}", capture.retrieved);
    println!("wraps      : {}", capture.wraps);
    match (capture.last_receive, capture.last_clock) {
        (Some(receive), Some(clock)) => println!("last sample: {receive} for second {clock}"),
        _ => println!("last sample: -"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let path = match socket_path(&args) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let state = match read_state(&path).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Could not read state from {path:?}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&state) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&state);
    }

    ExitCode::SUCCESS
}
