//! Line-oriented front end for trix matches.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use trix_client::{
    driver::{GameView, PhaseView},
    ApiClient, Config, Driver, EvmWallet, Intent, MatchView, Notice, NoticeLevel, WsConnector,
};
use trix_types::{api::Period, Address, GameResult, MatchId};

#[derive(Parser, Debug)]
#[command(author, version, about = "Staked tic-tac-toe client")]
struct Args {
    /// JSON config file (defaults apply to missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Match API root (http(s)://host/api)
    #[arg(long)]
    api_url: Option<String>,

    /// Real-time channel endpoint (ws(s)://host/path)
    #[arg(long)]
    realtime_url: Option<String>,

    /// EVM JSON-RPC endpoint URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// EVM chain id
    #[arg(long)]
    chain_id: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect the wallet and play interactively
    Play,
    /// Show the leaderboard
    Leaderboard {
        /// all, week or month
        #[arg(long, default_value = "all")]
        period: Period,
    },
    /// Show a player's statistics
    Stats { address: String },
}

const HELP: &str = "\
commands:
  connect | disconnect | refresh
  mint <amount>          mint stable tokens
  buy <amount>           buy game tokens with stable tokens
  create <stake>         create a match
  join <match id>        join an open match
  <0-8>                  play a cell
  cancel                 stop waiting for an opponent
  leave                  leave the current match
  lobby                  return to the lobby after a game
  help | quit";

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path).context("Failed to load config")?,
        None => Config::default(),
    };
    let mut config = config.with_env();
    if let Some(url) = &args.api_url {
        config.api_url = url.clone();
    }
    if let Some(url) = &args.realtime_url {
        config.realtime_url = url.clone();
    }
    if let Some(url) = &args.rpc_url {
        config.rpc_url = url.clone();
    }
    if let Some(chain_id) = args.chain_id {
        config.chain_id = chain_id;
    }
    config.validate().context("Invalid config")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    match args.command {
        Command::Play => play(&config).await,
        Command::Leaderboard { period } => leaderboard(&config, period).await,
        Command::Stats { address } => stats(&config, &address).await,
    }
}

async fn leaderboard(config: &Config, period: Period) -> Result<()> {
    let api = ApiClient::new(&config.api_url)?;
    let entries = api
        .leaderboard(period)
        .await
        .context("Failed to fetch leaderboard")?;
    if entries.is_empty() {
        println!("No players yet");
        return Ok(());
    }
    println!(
        "{:>4}  {:<15}  {:>5}  {:>6}  {:>7}  {:>10}",
        "rank", "player", "wins", "losses", "win %", "earnings"
    );
    for (rank, entry) in entries.iter().enumerate() {
        println!(
            "{:>4}  {:<15}  {:>5}  {:>6}  {:>6.1}%  {:>10.2}",
            rank + 1,
            entry.address.short(),
            entry.total_wins,
            entry.total_losses,
            entry.win_rate,
            entry.total_earnings,
        );
    }
    Ok(())
}

async fn stats(config: &Config, address: &str) -> Result<()> {
    let address = Address::parse(address).map_err(|err| anyhow!("{err}"))?;
    let api = ApiClient::new(&config.api_url)?;
    let Some(stats) = api
        .player_stats(&address)
        .await
        .context("Failed to fetch player stats")?
    else {
        println!("No stats for {address}");
        return Ok(());
    };
    match stats.rank {
        Some(rank) => println!("{address} (rank #{rank})"),
        None => println!("{address} (unranked)"),
    }
    println!("  matches:    {}", stats.total_matches);
    println!("  wins:       {}", stats.total_wins);
    println!("  losses:     {}", stats.total_losses);
    println!("  win rate:   {:.1}%", stats.win_rate);
    println!("  win streak: {}", stats.win_streak);
    println!("  earnings:   {:.2}", stats.total_earnings);
    Ok(())
}

async fn play(config: &Config) -> Result<()> {
    let wallet = Arc::new(EvmWallet::new(config)?);
    let api = Arc::new(ApiClient::new(&config.api_url)?);
    let realtime = Arc::new(WsConnector::new(&config.realtime_url)?);
    let (driver, handle) = Driver::new(wallet, api, realtime, config);
    let driver = tokio::spawn(driver.run());

    let mut views = handle.views;
    let mut notices = handle.notices;
    let intents = handle.intents;
    let renderer = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = views.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = views.borrow_and_update().clone();
                    render(&view);
                }
                Some(notice) = notices.recv() => print_notice(&notice),
                else => break,
            }
        }
    });

    println!("{HELP}");
    intents.send(Intent::Connect)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line) {
            Ok(Some(intent)) => intents.send(intent)?,
            Ok(None) => break,
            Err(message) => println!("{message}"),
        }
    }

    info!("shutting down");
    let _ = intents.send(Intent::Shutdown);
    driver.await?;
    renderer.abort();
    Ok(())
}

/// `Ok(None)` means quit.
fn parse_command(line: &str) -> std::result::Result<Option<Intent>, String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default().to_ascii_lowercase();
    let argument = parts.next();
    let required = |name: &str| {
        argument
            .map(str::to_string)
            .ok_or(format!("usage: {name} <value>"))
    };
    let intent = match command.as_str() {
        "quit" | "exit" => return Ok(None),
        "help" => return Err(HELP.to_string()),
        "connect" => Intent::Connect,
        "disconnect" => Intent::Disconnect,
        "refresh" => Intent::Refresh,
        "mint" => Intent::MintStable(required("mint")?),
        "buy" => Intent::BuyGameToken(required("buy")?),
        "create" => Intent::CreateMatch(required("create")?),
        "join" => {
            let id: MatchId = required("join")?
                .parse()
                .map_err(|err| format!("{err}"))?;
            Intent::JoinMatch(id)
        }
        "cancel" => Intent::CancelWait,
        "leave" => Intent::Leave,
        "lobby" => Intent::BackToLobby,
        other => match other.parse::<usize>() {
            Ok(cell) => Intent::Cell(cell),
            Err(_) => return Err(format!("unknown command: {other} (try help)")),
        },
    };
    Ok(Some(intent))
}

fn print_notice(notice: &Notice) {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
    };
    println!("[{tag}] {}", notice.message);
}

fn render(view: &MatchView) {
    let Some(account) = &view.account else {
        println!("-- wallet not connected");
        return;
    };
    println!(
        "-- {}  stable {}  game {}{}{}",
        account.address.short(),
        account.balances.stable,
        account.balances.game,
        if view.connection.connected { "" } else { "  (offline)" },
        if view.busy { "  (working...)" } else { "" },
    );
    match &view.phase {
        PhaseView::Lobby => {
            if view.open_matches.is_empty() {
                println!("no open matches");
            }
            for open in &view.open_matches {
                println!(
                    "  match {:>4}  stake {:>8}  by {}",
                    open.match_id,
                    open.stake_amount,
                    open.player1.short()
                );
            }
        }
        PhaseView::Waiting { match_id, stake } => {
            println!("match {match_id} (stake {stake}): waiting for an opponent");
        }
        PhaseView::Playing(game) => render_game(game),
    }
}

fn render_game(game: &GameView) {
    let opponent = game
        .opponent
        .as_ref()
        .map(Address::short)
        .unwrap_or_else(|| "?".to_string());
    println!(
        "match {} vs {opponent}  stake {}  you are {}",
        game.match_id, game.stake, game.symbol
    );
    println!("{}", game.board);
    let status = match game.result {
        Some(GameResult::Win) => "you won (type lobby)",
        Some(GameResult::Lose) => "you lost (type lobby)",
        Some(GameResult::Tie) => "tie (type lobby)",
        None if game.local_turn => "your turn",
        None => "opponent's turn",
    };
    println!("{status}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("4").unwrap(), Some(Intent::Cell(4)));
        assert_eq!(
            parse_command("create 2.5").unwrap(),
            Some(Intent::CreateMatch("2.5".into()))
        );
        assert_eq!(
            parse_command("JOIN 12").unwrap(),
            Some(Intent::JoinMatch(MatchId(12)))
        );
        assert_eq!(parse_command("quit").unwrap(), None);
        assert!(parse_command("join").is_err());
        assert!(parse_command("join x").is_err());
        assert!(parse_command("dance").is_err());
    }
}
