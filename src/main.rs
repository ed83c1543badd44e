//! DBank - Distributed bank client
//!
//! Command-line front end for the bank server's UDP protocol.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dbank::config::{self, Config};
use dbank::network::{Client, MonitorEnd, MonitorUpdate, RequestIds, UdpTransport};
use dbank::protocol::{self, Currency, Operation, Reply, Response};

/// DBank - Distributed bank client
#[derive(Parser)]
#[command(name = "dbank")]
#[command(author = "DBank Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Talk to a distributed bank server over UDP", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Server host (overrides configuration)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port (overrides configuration)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Per-attempt reply timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Only accept replies that echo the request id
    #[arg(long, global = true)]
    verify_reply_id: bool,

    /// Print decoded replies as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// One command typed at the shell prompt
#[derive(Parser)]
#[command(name = "dbank", no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new account
    Open {
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        /// usd, rmb, sgd, jpy or bpd
        #[arg(long)]
        currency: Currency,
        #[arg(long)]
        balance: f32,
    },

    /// Close an existing account
    Close {
        #[arg(long)]
        account: i32,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },

    /// Query an account balance
    Balance {
        #[arg(long)]
        account: i32,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        currency: Currency,
    },

    /// Deposit money into an account
    Deposit {
        #[arg(long)]
        account: i32,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        currency: Currency,
        #[arg(long)]
        amount: f32,
    },

    /// Withdraw money from an account
    Withdraw {
        #[arg(long)]
        account: i32,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        currency: Currency,
        #[arg(long)]
        amount: f32,
    },

    /// Transfer money to another account
    Transfer {
        /// Sending account
        #[arg(long)]
        account: i32,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        currency: Currency,
        #[arg(long)]
        amount: f32,
        /// Receiving account
        #[arg(long)]
        to: i32,
    },

    /// Exchange between currencies inside one account
    Exchange {
        #[arg(long)]
        account: i32,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        from: Currency,
        #[arg(long)]
        to: Currency,
        /// Amount to receive in the target currency
        #[arg(long)]
        amount: f32,
    },

    /// Receive account updates pushed by the server
    Monitor {
        /// Window length in milliseconds
        #[arg(short, long, value_parser = clap::value_parser!(i64).range(1..))]
        duration_ms: i64,
    },

    /// Run commands from standard input over one connection
    Shell,

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    /// The request this command sends, if any
    fn operation(&self) -> Option<Operation> {
        let op = match self {
            Commands::Open { name, password, currency, balance } => Operation::Open {
                name: name.clone(),
                password: password.clone(),
                initial_balance: *balance,
                currency: *currency,
            },
            Commands::Close { account, name, password } => Operation::Close {
                account_id: *account,
                name: name.clone(),
                password: password.clone(),
            },
            Commands::Balance { account, name, password, currency } => Operation::CheckBalance {
                account_id: *account,
                name: name.clone(),
                password: password.clone(),
                currency: *currency,
            },
            Commands::Deposit { account, name, password, currency, amount } => Operation::Deposit {
                account_id: *account,
                name: name.clone(),
                password: password.clone(),
                currency: *currency,
                amount: *amount,
            },
            Commands::Withdraw { account, name, password, currency, amount } => {
                Operation::Withdraw {
                    account_id: *account,
                    name: name.clone(),
                    password: password.clone(),
                    currency: *currency,
                    amount: *amount,
                }
            }
            Commands::Transfer { account, name, password, currency, amount, to } => {
                Operation::Transfer {
                    sender_id: *account,
                    name: name.clone(),
                    password: password.clone(),
                    currency: *currency,
                    amount: *amount,
                    receiver_id: *to,
                }
            }
            Commands::Exchange { account, name, password, from, to, amount } => {
                Operation::Exchange {
                    account_id: *account,
                    name: name.clone(),
                    password: password.clone(),
                    from_currency: *from,
                    to_currency: *to,
                    amount: *amount,
                }
            }
            Commands::Monitor { duration_ms } => Operation::Monitor {
                duration_ms: *duration_ms,
            },
            Commands::Shell | Commands::Config { .. } => return None,
        };
        Some(op)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let level = if cli.verbose || config.general.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Some(host) = cli.host.clone() {
        config.client.host = host;
    }
    if let Some(port) = cli.port {
        config.client.port = port;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.client.timeout_ms = timeout_ms;
    }
    if cli.verify_reply_id {
        config.client.verify_reply_id = true;
    }

    tracing::debug!(
        "Wire format: request {} bytes, payload {} bytes, datagram ceiling {} bytes",
        protocol::REQUEST_SIZE,
        protocol::PAYLOAD_SIZE,
        protocol::MAX_DATAGRAM_SIZE
    );

    match &cli.command {
        Commands::Config { generate, output } => {
            if *generate {
                if let Some(path) = output {
                    config::sample_config().save(path)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", config::generate_sample_config()?);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Shell => {
            run_shell(&config, cli.json).await?;
        }
        command => {
            let mut client = Client::connect(config.client.network()).await?;
            let mut ids = RequestIds::from_clock();
            run_command(&mut client, &mut ids, command, cli.json).await?;
        }
    }

    Ok(())
}

/// Send the request for one command and print what comes back
async fn run_command(
    client: &mut Client<UdpTransport>,
    ids: &mut RequestIds,
    command: &Commands,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Monitor { duration_ms } => run_monitor(client, ids, *duration_ms, json).await,
        command => match command.operation() {
            Some(operation) => run_call(client, ids, &operation, json).await,
            None => anyhow::bail!("Command not available here"),
        },
    }
}

/// Read commands line by line, keeping one client and one id sequence
async fn run_shell(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut client = Client::connect(config.client.network()).await?;
    let mut ids = RequestIds::from_clock();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("dbank> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["exit"] | ["quit"] => break,
            _ => {}
        }

        let command = match ShellLine::try_parse_from(words.iter().copied()) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                println!("{}", e.render());
                continue;
            }
        };
        if matches!(command, Commands::Shell | Commands::Config { .. }) {
            println!("'{}' is not available in the shell", words[0]);
            continue;
        }

        if let Err(e) = run_command(&mut client, &mut ids, &command, json).await {
            println!("Error: {}", e);
        }
    }

    Ok(())
}

/// Send a single request and print the reply
async fn run_call(
    client: &mut Client<UdpTransport>,
    ids: &mut RequestIds,
    operation: &Operation,
    json: bool,
) -> anyhow::Result<()> {
    tracing::info!("Sending {} request", operation.op_code());

    let response = client.call(ids.next_id(), operation).await?;
    print_reply(Reply::from(response), json)?;

    Ok(())
}

/// Register for updates and print them until the window closes
async fn run_monitor(
    client: &mut Client<UdpTransport>,
    ids: &mut RequestIds,
    duration_ms: i64,
    json: bool,
) -> anyhow::Result<()> {
    let (update_tx, mut update_rx) = mpsc::unbounded_channel::<MonitorUpdate>();

    let printer = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            tracing::debug!("Update from {}", update.peer);
            if let Err(e) = print_reply(Reply::from(update.callback), json) {
                tracing::error!("Failed to print update: {}", e);
            }
        }
    });

    println!("Monitoring for {} ms...", duration_ms);

    let report = client.monitor(ids.next_id(), duration_ms, &update_tx).await;
    drop(update_tx);
    printer.await?;
    let report = report?;

    match &report.initial {
        Ok(response) => print_response_summary(response),
        Err(e) => println!("Registration: {}", e),
    }

    match report.ended_by {
        MonitorEnd::Deadline | MonitorEnd::Cancelled => {
            println!("Monitor window ended ({} update(s)).", report.callbacks);
        }
        MonitorEnd::Failed(e) => {
            println!("Monitor ended: {}", e);
        }
    }

    Ok(())
}

fn print_response_summary(response: &Response) {
    println!("Registration: {}", reply_line(&Reply::Response(response.clone())));
}

/// Human-readable rendering of a reply
fn reply_line(reply: &Reply) -> String {
    match reply {
        Reply::Response(response) => format!("{}: {}", response.status, response.message),
        Reply::Callback(callback) => format!("Update: {}", callback.message),
    }
}

fn print_reply(reply: Reply, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(&reply)?);
    } else {
        println!("{}", reply_line(&reply));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbank::protocol::{Callback, Status};

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "dbank", "deposit", "--account", "1001", "--name", "Alice", "--password", "pw123",
            "--currency", "usd", "--amount", "50",
        ])
        .unwrap();

        match cli.command.operation() {
            Some(Operation::Deposit { account_id, currency, amount, .. }) => {
                assert_eq!(account_id, 1001);
                assert_eq!(currency, Currency::Usd);
                assert_eq!(amount, 50.0);
            }
            _ => panic!("Wrong operation"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_currency() {
        let cli = Cli::try_parse_from([
            "dbank", "balance", "--account", "1", "--name", "A", "--password", "p", "--currency",
            "eur",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_monitor_requires_positive_duration() {
        assert!(Cli::try_parse_from(["dbank", "monitor", "--duration-ms", "0"]).is_err());

        let cli = Cli::try_parse_from(["dbank", "monitor", "-d", "1500"]).unwrap();
        assert!(matches!(
            cli.command.operation(),
            Some(Operation::Monitor { duration_ms: 1500 })
        ));
    }

    #[test]
    fn test_config_command_has_no_operation() {
        let cli = Cli::try_parse_from(["dbank", "config", "--generate"]).unwrap();
        assert!(cli.command.operation().is_none());

        let cli = Cli::try_parse_from(["dbank", "shell"]).unwrap();
        assert!(cli.command.operation().is_none());
    }

    #[test]
    fn test_shell_line_parsing() {
        let words = [
            "withdraw", "--account", "7", "--name", "Bob", "--password", "pw", "--currency", "sgd",
            "--amount", "12.5",
        ];
        let line = ShellLine::try_parse_from(words).unwrap();
        assert!(matches!(
            line.command.operation(),
            Some(Operation::Withdraw { account_id: 7, currency: Currency::Sgd, .. })
        ));

        assert!(ShellLine::try_parse_from(["deposit", "--account", "1"]).is_err());
        assert!(ShellLine::try_parse_from(["launch"]).is_err());
    }

    #[test]
    fn test_reply_line_labels() {
        let response = |code: i32| Response {
            id: 1,
            status: Status::from_code(code),
            message: "balance 10.00 USD".into(),
            lossy: false,
        };

        assert_eq!(reply_line(&response(1).into()), "Success: balance 10.00 USD");
        assert_eq!(reply_line(&response(2).into()), "Fail: balance 10.00 USD");
        assert_eq!(reply_line(&response(3).into()), "Error: balance 10.00 USD");
        assert_eq!(reply_line(&response(4).into()), "Response: balance 10.00 USD");
        assert_eq!(reply_line(&response(9).into()), "Response: balance 10.00 USD");

        let callback = Callback {
            message: "account 1 deposit".into(),
            lossy: false,
        };
        assert_eq!(reply_line(&callback.into()), "Update: account 1 deposit");
    }
}
