use clap::Parser;
use std::{
    error::Error,
    io::{self, Write},
    net::SocketAddr,
    time::Duration,
};

use mishmash::{
    ConversationConfig,
    cli::{execute, prompt},
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address of the server
    address: SocketAddr,
    /// How long to wait for the server to acknowledge a setup, in milliseconds
    #[arg(long, default_value_t = 1500)]
    setup_ack_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let config = ConversationConfig::default()
        .with_setup_ack_timeout(Duration::from_millis(cli.setup_ack_timeout));

    loop {
        let cmd = match prompt(io::stdin().lock(), StdOut(io::stdout().lock())) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        match execute(cmd, cli.address, &config, StdOut(io::stdout().lock())).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

/// StdOut wrapper that automatically flushes content after every write.
struct StdOut<W: Write>(W);

impl<W: Write> Write for StdOut<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res = self.0.write(buf);
        if res.is_ok() {
            self.0.flush()?
        }
        res
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
