use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use visit_notify::app::AppContext;
use visit_notify::config::Config;
use visit_notify::models::{BulkAction, Frequency, GraceContext, TargetId};

#[derive(Parser)]
#[command(name = "visit-notify-admin")]
#[command(about = "Visit notification admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enable notifications for one or more targets
    Enable {
        /// Targets as kind:id, e.g. post:12 or term:4
        #[arg(required = true)]
        targets: Vec<TargetId>,
        /// Batch into an hourly digest instead of notifying on every visit
        #[arg(long)]
        hourly: bool,
    },
    /// Disable notifications for one or more targets
    Disable {
        #[arg(required = true)]
        targets: Vec<TargetId>,
    },
    /// Show a target's notification settings and pending visits
    Status { target: TargetId },
    /// Run an hourly or daily digest now
    Tick { frequency: Frequency },
    /// Show or change site-wide settings
    Settings {
        #[arg(long)]
        enable_notifications: Option<bool>,
        #[arg(long)]
        enable_logged_in_users: Option<bool>,
        #[arg(long)]
        disable_crawlers: Option<bool>,
        #[arg(long)]
        ip_grace_period: Option<bool>,
        /// site or post
        #[arg(long)]
        ip_grace_period_context: Option<String>,
        /// Seconds
        #[arg(long)]
        ip_grace_period_duration: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let app = AppContext::from_config(&config).await?;

    match cli.command {
        Commands::Enable { targets, hourly } => {
            let action = if hourly {
                BulkAction::EnableHourly
            } else {
                BulkAction::EnableVisit
            };
            let updated = app.apply_bulk(action, &targets).await?;
            println!("✓ Enabled notifications for {} target(s)", updated);
        }
        Commands::Disable { targets } => {
            let updated = app.apply_bulk(BulkAction::Disable, &targets).await?;
            println!("✓ Disabled notifications for {} target(s)", updated);
        }
        Commands::Status { target } => {
            let target_config = app.settings().target_config(&target).await?;
            let pending = app.batches().snapshot(&target).await?;
            println!("{:<16} {}", "Target", target);
            println!("{:<16} {}", "Status", target_config.status_label());
            println!("{:<16} {}", "Logged-in users", target_config.logged_in.as_str());
            println!(
                "{:<16} {}",
                "Title",
                target_config.title.as_deref().unwrap_or("-")
            );
            println!("{:<16} {}", "Pending visits", pending.len());
        }
        Commands::Tick { frequency } => match app.run_tick(frequency).await? {
            Some(report) => println!(
                "✓ {} tick: {} notified, {} empty, {} busy, {} failed",
                frequency,
                report.notified,
                report.skipped_empty,
                report.skipped_busy,
                report.failed
            ),
            None => println!("⚠ Notifications are disabled site-wide; nothing sent"),
        },
        Commands::Settings {
            enable_notifications,
            enable_logged_in_users,
            disable_crawlers,
            ip_grace_period,
            ip_grace_period_context,
            ip_grace_period_duration,
        } => {
            let store = app.settings();
            let mut settings = store.settings().await?;
            let mut changed = false;

            if let Some(value) = enable_notifications {
                settings.enable_notifications = value;
                changed = true;
            }
            if let Some(value) = enable_logged_in_users {
                settings.enable_logged_in_users = value;
                changed = true;
            }
            if let Some(value) = disable_crawlers {
                settings.disable_crawlers = value;
                changed = true;
            }
            if let Some(value) = ip_grace_period {
                settings.ip_grace_period = value;
                changed = true;
            }
            if let Some(value) = ip_grace_period_context {
                let Some(context) = GraceContext::parse(&value) else {
                    bail!("Unknown grace period context '{}', expected site or post", value);
                };
                settings.ip_grace_period_context = Some(context);
                changed = true;
            }
            if let Some(value) = ip_grace_period_duration {
                settings.ip_grace_period_duration = value;
                changed = true;
            }

            if changed {
                store.save_settings(&settings).await?;
                println!("✓ Settings updated");
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}
