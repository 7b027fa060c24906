use clap::Parser;
use std::{
    error::Error,
    io::{self, Write},
    time::Duration,
};

use tyrant::{
    Command, SessionConfig, Timeouts, Tyrant, execute,
    protocol::{DEFAULT_HOST, DEFAULT_PORT},
    prompt,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host name or address
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Connect, read and write timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let mut config = SessionConfig::new(cli.host, cli.port);
    if let Some(ms) = cli.timeout_ms {
        config = config.with_timeouts(Timeouts::uniform(Duration::from_millis(ms)));
    }

    let mut db = Tyrant::connect(&config)?;
    println!("connected to a {} database", db.db_type());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        if cmd == Command::Exit {
            if let Err(e) = db.into_session().close() {
                eprintln!("failed to close the session. error: {e}");
            }
            break;
        }

        match execute(&mut db, cmd) {
            Ok(None) => {}
            Ok(Some(out)) => {
                writeln!(stdout, "{out}")?;
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}
