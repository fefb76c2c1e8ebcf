//! hotspot-server: runs the access-point responder on a host TCP stack
//!
//! Configuration comes from `HOTSPOT_*` environment variables. Typing `d` and
//! Enter on stdin disables the access point and shuts the server down.

mod logger;

use hotspot_core::native::{self, ConnectionTracker};
use hotspot_core::{Acceptor, Board, ServerConfig, SimulatedPin, SimulatedSensor};
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Raw reading the simulated sensor wobbles around, close to 27 °C
const SIMULATED_RAW: u16 = 876;

#[tokio::main]
async fn main() -> ExitCode {
    let level = logger::parse_level(std::env::var(logger::LOG_ENV).ok().as_deref());
    if let Err(e) = logger::init(level) {
        eprintln!("Failed to install logger: {e}");
    }

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Initializing");
    info!("LED control on GPIO{} and internal temperature reading", config.output_pin);
    info!(
        "Access point enabled: SSID='{}' ({})",
        config.access_point.ssid, config.access_point.auth
    );
    info!("Access point address: {}/{}", config.gateway, config.netmask);

    let listener = match native::open(&config) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to open TCP server: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!("TCP server listening on port {}", config.port);

    println!(
        "Try connecting to '{}' with passphrase '{}' (press 'd' to disable access point)",
        config.access_point.ssid, config.access_point.passphrase
    );
    println!(
        "Open {} to control the LED on GPIO {} and see the temperature",
        config.control_url(),
        config.output_pin
    );

    let board = Board::new(
        SimulatedSensor::new(SIMULATED_RAW).with_wobble(4),
        SimulatedPin::new(config.output_pin),
    );
    let acceptor = Acceptor::new(config, board);
    let tracker = Arc::new(ConnectionTracker::new());

    tokio::spawn(watch_keys(Arc::clone(&tracker)));

    let acceptor = native::serve(listener, acceptor, tracker).await;
    let stats = acceptor.stats();
    info!(
        "Served {} connection(s): {} completed, {} dropped, {} rejected",
        stats.accepted, stats.completed, stats.dropped, stats.rejected
    );

    println!("Done. Access point disabled.");
    ExitCode::SUCCESS
}

/// Start shutdown on the first `d` or `D` read from stdin
async fn watch_keys(tracker: Arc<ConnectionTracker>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_disable_key(&line) => {
                info!("Access point disabled by user");
                tracker.start_shutdown();
                return;
            }
            Ok(Some(_)) => {}
            // stdin closed; keep serving until something else stops us
            Ok(None) => return,
            Err(e) => {
                error!("Failed to read stdin: {e}");
                return;
            }
        }
    }
}

fn is_disable_key(line: &str) -> bool {
    line.trim().chars().any(|c| c.eq_ignore_ascii_case(&'d'))
}
