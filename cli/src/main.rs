//! Callpool CLI - headless agent client for the call-campaign server

mod client;
mod messages;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::client::PoolClient;
use crate::messages::UpdateItemBody;

#[derive(Parser)]
#[command(name = "callpool")]
#[command(about = "CLI client for Callpool - outreach call-campaign coordinator")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(short, long, default_value = "http://localhost:3000")]
    server: String,

    /// Your agent identity
    #[arg(short, long, env = "CALLPOOL_AGENT", default_value = "cli-agent")]
    agent: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a campaign's roster (activates a pending campaign)
    Join {
        /// Campaign ID
        campaign: Uuid,
    },

    /// Claim the next work item from a campaign
    Claim {
        /// Campaign ID
        campaign: Uuid,

        /// Claim from the round-two pool instead
        #[arg(long)]
        round_two: bool,
    },

    /// Record the outcome of a call
    Done {
        /// Work item ID
        item: Uuid,

        /// Outcome: present, absent, no_answer, wrong_number, callback
        #[arg(short, long)]
        status: Option<String>,

        /// Comment to append
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Start the round-two pass over no-answer items
    RoundTwo {
        /// Campaign ID
        campaign: Uuid,
    },

    /// Import a roster batch from a JSON file
    Import {
        /// Campaign ID
        campaign: Uuid,

        /// Path to a JSON array of records
        file: std::path::PathBuf,
    },

    /// Undo a recent import batch
    Undo {
        /// Campaign ID
        campaign: Uuid,

        /// Undo token returned by import
        token: Uuid,
    },

    /// Show campaign status and the leaderboard
    Stats {
        /// Campaign ID
        campaign: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callpool_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = PoolClient::new(&cli.server, &cli.agent);

    match cli.command {
        Commands::Join { campaign } => {
            let joined = client.join(campaign).await?;
            println!("joined '{}' ({} agents on roster)", joined.name, joined.roster.len());
        }

        Commands::Claim { campaign, round_two } => {
            if round_two {
                match client.claim_round_two(campaign).await? {
                    Some(item) => print_item(&item),
                    None => println!("round-two pool is empty, check back later"),
                }
            } else {
                let claim = client.claim(campaign).await?;
                match claim.item {
                    Some(item) => print_item(&item),
                    None => println!(
                        "nothing to claim ({} pending, {} done of {})",
                        claim.stats.pending, claim.stats.completed, claim.stats.total
                    ),
                }
            }
        }

        Commands::Done { item, status, comment } => {
            let updated = client
                .update_item(item, &UpdateItemBody { status, comment })
                .await?;
            println!(
                "{}: status={}",
                updated.name,
                updated.status.as_deref().unwrap_or("pending")
            );
        }

        Commands::RoundTwo { campaign } => {
            let response = client.start_round_two(campaign).await?;
            println!("round two started with {} items", response.eligible);
        }

        Commands::Import { campaign, file } => {
            let text = std::fs::read_to_string(&file)?;
            let records: serde_json::Value = serde_json::from_str(&text)?;
            let summary = client.import(campaign, records).await?;
            println!(
                "added {} / updated {} / skipped {}",
                summary.added, summary.updated, summary.skipped
            );
            if let Some(token) = summary.undo_token {
                let minutes = summary.expires_in_ms.unwrap_or(0) / 60_000;
                println!("undo token: {} (expires in ~{} min)", token, minutes);
            }
        }

        Commands::Undo { campaign, token } => {
            let response = client.undo_import(campaign, token).await?;
            println!("removed {} imported items", response.removed);
        }

        Commands::Stats { campaign } => {
            let view = client.campaign(campaign).await?;
            println!("{} [{}]", view.name, view.status);
            println!(
                "  {} total, {} done, {} pending",
                view.stats.total, view.stats.completed, view.stats.pending
            );
            for tally in &view.stats.agents {
                println!("  {:>5}  {}", tally.count, tally.agent_id);
            }
        }
    }

    Ok(())
}

fn print_item(item: &messages::WorkItem) {
    println!("{} ({})", item.name, item.id);
    if let Some(phone) = &item.phone {
        println!("  phone: {}", phone);
    }
    if let Some(alt) = &item.alt_phone {
        println!("  alt:   {}", alt);
    }
    if let Some(group) = &item.group_label {
        println!("  group: {}", group);
    }
    for comment in &item.comments {
        println!("  [{}] {}: {}", comment.created_at.format("%H:%M"), comment.author, comment.body);
    }
}
