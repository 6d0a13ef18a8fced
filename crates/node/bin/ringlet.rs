use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ringlet_core::node::Node;
use ringlet_node::client;
use ringlet_node::logging::init_logging;
use ringlet_node::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Starts a long-running ring member.")]
    Run(RunCommand),
    #[command(about = "Loads a file of key:value lines into the ring.")]
    Load(LoadCommand),
    #[command(about = "Looks up keys interactively until quit.")]
    Query(QueryCommand),
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(
        long,
        short = 'a',
        default_value = "127.0.0.1",
        help = "Address this member binds and advertises",
        env
    )]
    pub address: String,

    #[arg(long, short = 'p', help = "Port this member binds and advertises", env)]
    pub port: u16,

    #[arg(
        long,
        requires = "bootstrap_port",
        help = "Address of a ring member to join through. Omit both bootstrap flags to seed a new ring",
        env
    )]
    pub bootstrap_address: Option<String>,

    #[arg(
        long,
        requires = "bootstrap_address",
        help = "Port of a ring member to join through",
        env
    )]
    pub bootstrap_port: Option<u16>,
}

#[derive(Args, Debug)]
struct TargetArgs {
    #[arg(
        long,
        short = 'a',
        default_value = "127.0.0.1",
        help = "Address of the ring member to connect to",
        env
    )]
    pub address: String,

    #[arg(long, short = 'p', help = "Port of the ring member to connect to", env)]
    pub port: u16,
}

#[derive(Args, Debug)]
struct LoadCommand {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(help = "File of key:value lines, one pair per line")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
struct QueryCommand {
    #[command(flatten)]
    target: TargetArgs,
}

async fn daemon_run(args: RunCommand) -> anyhow::Result<()> {
    let node = match (args.bootstrap_address, args.bootstrap_port) {
        (Some(bootstrap_address), Some(bootstrap_port)) => {
            Node::join(args.address, args.port, bootstrap_address, bootstrap_port).await?
        }
        _ => Node::seed(args.address, args.port),
    };

    let handle = node.spawn().await?;
    handle.run().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Command::Run(args) => daemon_run(args).await,
        Command::Load(args) => {
            client::load_file(&args.target.address, args.target.port, &args.file).await
        }
        Command::Query(args) => client::query_loop(&args.target.address, args.target.port).await,
    }
}
