use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use finai_core_sdk::{
    config::Settings,
    controller::{ChatController, SubmitOutcome, SubmitRejected},
    credential::{mask_secret, CredentialStore, MemoryCredentialStore, SqliteCredentialStore},
    dashboard,
    llm::{CannedAdvisor, CompletionClient, GeminiClient},
    models::{Message, RequestState, Role},
    server, telemetry,
};

/** \brief Placeholder key that satisfies the credential gate in offline mode. */
const OFFLINE_KEY: &str = "offline";

/**
 * \brief FinAI command line: dashboard pages and the advisor chat.
 */
#[derive(Parser, Debug)]
#[command(name = "finai", version, about = "FinAI financial dashboard and advisor chat")]
struct Cli {
    /** SQLite file holding the API key (overrides FINAI_DB). */
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /** Write telemetry lines to logs/finai.log. */
    #[arg(long, global = true, default_value_t = false)]
    telemetry: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * Manage the stored Gemini API key.
     */
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /**
     * Ask the advisor one question and print the reply.
     */
    Ask {
        #[arg(long)]
        prompt: String,
        /** Answer from built-in topics instead of calling Gemini. */
        #[arg(long, default_value_t = false)]
        offline: bool,
    },

    /**
     * Interactive chat; `/key <value>`, `/clear-key`, `/suggest`, `/quit`.
     */
    Chat {
        #[arg(long, default_value_t = false)]
        offline: bool,
    },

    /** Portfolio summary cards and market indices. */
    Overview,

    /** Watchlist, movers and sector performance. */
    Stocks,

    /** Expense breakdown, budgets and tips. */
    Expenses,

    /** Market news, optionally filtered by sentiment. */
    News {
        #[arg(long)]
        sentiment: Option<String>,
    },

    /**
     * Start the local HTTP service.
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
        #[arg(long, default_value_t = false)]
        offline: bool,
    },

    /** Check the stored key by listing available models. */
    Health,
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /** Save a new key, replacing the old one. */
    Set {
        #[arg(long)]
        value: String,
    },
    /** Remove the stored key. */
    Clear,
    /** Show whether a key is stored. */
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if cli.telemetry {
        settings.telemetry = true;
    }
    telemetry::set_enabled(settings.telemetry);

    match cli.command {
        Commands::Key { action } => {
            let store = open_store(&settings)?;
            match action {
                KeyAction::Set { value } => {
                    let mut controller =
                        ChatController::new(store, GeminiClient::from_settings(&settings));
                    controller
                        .save_credential(&value)
                        .context("save API key failed")?;
                    println!("API key saved to {}", settings.db_path.display());
                }
                KeyAction::Clear => {
                    store.clear().context("clear API key failed")?;
                    println!("API key removed.");
                }
                KeyAction::Status => match store.load().context("read API key failed")? {
                    Some(key) => println!("API key stored: {}", mask_secret(&key)),
                    None => println!("No API key stored. Run: finai key set --value <KEY>"),
                },
            }
        }
        Commands::Ask { prompt, offline } => {
            if offline {
                let controller =
                    ChatController::new(MemoryCredentialStore::with_secret(OFFLINE_KEY), CannedAdvisor);
                ask(controller, &prompt).await?;
            } else {
                let controller = ChatController::new(
                    open_store(&settings)?,
                    GeminiClient::from_settings(&settings),
                );
                ask(controller, &prompt).await?;
            }
        }
        Commands::Chat { offline } => {
            if offline {
                let controller =
                    ChatController::new(MemoryCredentialStore::with_secret(OFFLINE_KEY), CannedAdvisor);
                chat_loop(controller).await?;
            } else {
                let controller = ChatController::new(
                    open_store(&settings)?,
                    GeminiClient::from_settings(&settings),
                );
                chat_loop(controller).await?;
            }
        }
        Commands::Overview => print_overview(),
        Commands::Stocks => print_stocks(),
        Commands::Expenses => print_expenses(),
        Commands::News { sentiment } => print_news(sentiment.as_deref())?,
        Commands::Serve { addr, offline } => {
            if offline {
                let controller =
                    ChatController::new(MemoryCredentialStore::with_secret(OFFLINE_KEY), CannedAdvisor);
                server::run(&addr, server::AppState::new(controller), &settings.ui_dir).await?;
            } else {
                let gemini = GeminiClient::from_settings(&settings);
                let controller = ChatController::new(open_store(&settings)?, gemini.clone());
                let state = server::AppState::new(controller).with_gemini(gemini);
                server::run(&addr, state, &settings.ui_dir).await?;
            }
        }
        Commands::Health => {
            let store = open_store(&settings)?;
            let key = store
                .load()
                .context("read API key failed")?
                .context("no API key stored, run: finai key set --value <KEY>")?;
            let gemini = GeminiClient::from_settings(&settings);
            let models = gemini
                .list_models(&key)
                .await
                .context("Gemini health check failed")?;
            println!(
                "ok: {} models visible at {} (using {})",
                models.len(),
                gemini.api_base(),
                gemini.model()
            );
        }
    }

    Ok(())
}

fn open_store(settings: &Settings) -> Result<SqliteCredentialStore> {
    SqliteCredentialStore::open(&settings.db_path)
        .with_context(|| format!("open database {} failed", settings.db_path.display()))
}

async fn ask<S: CredentialStore, C: CompletionClient>(
    mut controller: ChatController<S, C>,
    prompt: &str,
) -> Result<()> {
    match controller.submit(prompt).await {
        Ok(outcome) => {
            if let Some(reply) = controller.conversation().last() {
                println!("{}", reply.text);
            }
            if outcome == SubmitOutcome::Failed {
                bail!("completion failed; check the key with: finai key status");
            }
            Ok(())
        }
        Err(SubmitRejected::AwaitingCredential) => {
            bail!("no API key stored, run: finai key set --value <KEY>")
        }
        Err(rejected) => bail!("{}", rejected),
    }
}

async fn chat_loop<S: CredentialStore, C: CompletionClient>(
    mut controller: ChatController<S, C>,
) -> Result<()> {
    for message in controller.snapshot() {
        print_message(message);
    }
    print_state_hint(controller.state());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin failed")? {
        let line = line.trim();
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "/quit" | "/exit" => break,
            "/key" => match controller.save_credential(arg) {
                Ok(()) => println!("API key saved."),
                Err(err) => println!("{}", err),
            },
            "/clear-key" => {
                controller.clear_credential().context("clear API key failed")?;
                print_state_hint(controller.state());
            }
            "/suggest" => {
                for question in dashboard::suggested_questions() {
                    println!("  - {}", question);
                }
            }
            _ => {
                let before = controller.snapshot().len();
                match controller.submit(line).await {
                    Ok(outcome) => {
                        for message in &controller.snapshot()[before..] {
                            if message.role != Role::User {
                                print_message(message);
                            }
                        }
                        if outcome == SubmitOutcome::Failed {
                            print_state_hint(controller.state());
                        }
                    }
                    Err(SubmitRejected::EmptyInput) => {}
                    Err(rejected) => println!("({})", rejected),
                }
            }
        }
    }
    Ok(())
}

fn print_message(message: &Message) {
    println!(
        "[{:02}:{:02}] {}: {}",
        message.created_at.hour(),
        message.created_at.minute(),
        message.role.as_str(),
        message.text
    );
}

fn print_state_hint(state: RequestState) {
    if state == RequestState::AwaitingCredential {
        println!("(an API key is required; enter it with /key <value>)");
    }
}

fn print_overview() {
    println!("Financial Dashboard");
    for card in dashboard::stat_cards() {
        println!(
            "  {:<18} {:>20}  {} ({})",
            card.title, card.value, card.trend_value, card.description
        );
    }
    println!();
    println!("Markets");
    for m in dashboard::market_updates() {
        println!("  {:<10} {:>10} {:>9} {:>7}", m.index, m.value, m.change, m.percent);
    }
}

fn print_stocks() {
    let stocks = dashboard::watchlist();
    println!("Watchlist");
    for s in &stocks {
        println!(
            "  {} {:<6} {:<12} {:>8.2} {:>+7.2} ({:+.2}%)",
            if s.favorite { "*" } else { " " },
            s.symbol,
            s.name,
            s.price,
            s.change,
            s.change_percent
        );
    }
    let (gainers, losers) = dashboard::movers(&stocks);
    let symbols = |list: &[&dashboard::Stock]| {
        list.iter().map(|s| s.symbol).collect::<Vec<_>>().join(", ")
    };
    println!("  gainers: {}", symbols(&gainers));
    println!("  losers:  {}", symbols(&losers));
    println!();
    println!("Sectors");
    for sector in dashboard::sectors() {
        println!("  {:<18} {:+.2}%", sector.name, sector.change);
    }
}

fn print_expenses() {
    let slices = dashboard::expense_breakdown();
    println!("Monthly Expenses (total ${:.2})", dashboard::expense_total(&slices));
    for share in dashboard::expense_shares(&slices) {
        println!("  {:<16} ${:>8.2} {:>5.1}%", share.name, share.value, share.percent);
    }
    println!();
    println!("Budgets");
    for c in dashboard::budget_categories() {
        let flag = if c.is_over_budget() { "  OVER" } else { "" };
        println!(
            "  {:<16} ${:>8.2} of ${:>8.2} ({:>5.1}%){}",
            c.name,
            c.amount,
            c.budget,
            c.used_percent(),
            flag
        );
    }
    println!();
    println!("Tips");
    for tip in dashboard::financial_tips() {
        println!("  {}: {}", tip.title, tip.description);
    }
}

fn print_news(sentiment: Option<&str>) -> Result<()> {
    let items = dashboard::news();
    let selected: Vec<&dashboard::NewsItem> = match sentiment {
        None => items.iter().collect(),
        Some(raw) => {
            let Some(parsed) = dashboard::Sentiment::parse(raw) else {
                bail!("unknown sentiment '{}', expected positive, negative or neutral", raw);
            };
            dashboard::news_with_sentiment(&items, parsed)
        }
    };
    for item in selected {
        println!("{} ({}, {})", item.title, item.source, item.time);
        println!("  {}", item.summary);
    }
    Ok(())
}
