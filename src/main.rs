//! Plexor - A Minimal Poll-Driven TCP Connection Server
//!
//! This is the main entry point for the Plexor server.
//! It binds the listener, installs the echo handler, and runs the
//! control loop until Ctrl+C.

use plexor::handlers::install_echo;
use plexor::server::{Server, ServerConfig, StopHandle};
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Command-line configuration
struct Config {
    /// Settings handed to the server
    server: ServerConfig,
    /// Maximum log level
    log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log_level: Level::INFO,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.server.host = value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.server.port = parse(value(&args, i, "--port"), "port number");
                    i += 2;
                }
                "--capacity" | "-c" => {
                    config.server.capacity = parse(value(&args, i, "--capacity"), "capacity");
                    i += 2;
                }
                "--accept-timeout" => {
                    let ms = parse(value(&args, i, "--accept-timeout"), "timeout");
                    config.server.accept_timeout = Duration::from_millis(ms);
                    i += 2;
                }
                "--client-timeout" => {
                    let ms = parse(value(&args, i, "--client-timeout"), "timeout");
                    config.server.client_timeout = Duration::from_millis(ms);
                    i += 2;
                }
                "--log-level" => {
                    config.log_level = parse(value(&args, i, "--log-level"), "log level");
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("Plexor version {}", plexor::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }
}

/// Returns the value following the flag at `i`, or exits.
fn value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v.as_str(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn parse<T: std::str::FromStr>(raw: &str, what: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid {}: {}", what, raw);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
Plexor - A Minimal Poll-Driven TCP Connection Server

USAGE:
    plexor [OPTIONS]

OPTIONS:
    -h, --host <HOST>            Host to bind to (default: {host})
    -p, --port <PORT>            Port to listen on (default: {port})
    -c, --capacity <N>           Number of client slots (default: {capacity})
        --accept-timeout <MS>    Listener poll timeout in ms (default: 10)
        --client-timeout <MS>    Client poll timeout in ms (default: 100)
        --log-level <LEVEL>      trace, debug, info, warn or error (default: info)
    -v, --version                Print version information
        --help                   Print this help message

EXAMPLES:
    plexor                       # Echo server on {host}:{port}
    plexor --port 9000 -c 64     # 64 clients on port 9000

CONNECTING:
    $ nc 127.0.0.1 {port}
    hello
    hello
"#,
        host = plexor::DEFAULT_HOST,
        port = plexor::DEFAULT_PORT,
        capacity = plexor::DEFAULT_CAPACITY,
    );
}

fn print_banner(server: &Server) {
    println!(
        r#"
Plexor v{} - Minimal Poll-Driven TCP Connection Server
──────────────────────────────────────────────────────
Server started on {}
Client slots: {}

Use Ctrl+C to shutdown gracefully.
"#,
        plexor::VERSION,
        server.local_addr(),
        server.config().capacity,
    );
}

/// Waits for Ctrl+C on a helper thread and asks the server to stop.
fn watch_ctrl_c(stop: StopHandle) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "Failed to start signal watcher, Ctrl+C will not stop gracefully");
            return;
        }
    };

    runtime.block_on(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping server...");
                stop.request_stop();
            }
            Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging, tagged with source location
    FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Bind the listener; failing here is fatal
    let mut server = match Server::bind(config.server) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            std::process::exit(1);
        }
    };

    print_banner(&server);

    // Ctrl+C flips the running flag and wakes a blocking accept
    let stop = server.stop_handle();
    std::thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || watch_ctrl_c(stop))?;

    install_echo(&mut server);
    server.run();

    info!("Server shutdown complete");
    Ok(())
}
