use std::{
    error::Error,
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, macros::format_description};
use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use ledger_engine::{
    Account, AccountId, AccountType, Config, DefaultCategories, OwnerId, RecurringInterval,
    Transaction, TransactionType,
    account::{create_account, get_default_account, list_accounts, set_default_account},
    budget::{check_budget_alerts, set_budget},
    db,
    money::parse_amount,
    notify::JsonLinesNotifier,
    recurrence::run_recurring,
    report::monthly_report,
    transaction::record_transaction,
};

/// Operator commands for the ledger engine.
///
/// Results are printed to stdout as JSON. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the ledger's SQLite database.
    #[arg(long, env = "LEDGER_DB_PATH", default_value = "ledger.db")]
    db_path: PathBuf,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    #[arg(long, env = "LEDGER_TIMEZONE", default_value = Config::DEFAULT_TIMEZONE)]
    timezone: String,

    /// Also append debug logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database tables.
    Init,

    /// Create an account. The owner's first account becomes the default.
    CreateAccount {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        /// One of checking, savings or credit.
        #[arg(long, default_value = "checking")]
        kind: AccountType,
        #[arg(long, default_value = "0", allow_hyphen_values = true, value_parser = parse_amount)]
        opening_balance: Decimal,
        /// Make this the owner's default account.
        #[arg(long)]
        default: bool,
    },

    /// Make an account the owner's default account.
    SetDefault {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        account_id: AccountId,
    },

    /// List the owner's accounts, newest first.
    Accounts {
        #[arg(long)]
        owner: String,
    },

    /// Record an income or expense.
    Record {
        #[arg(long)]
        owner: String,
        /// Defaults to the owner's default account.
        #[arg(long)]
        account_id: Option<AccountId>,
        /// Either income or expense.
        #[arg(long)]
        kind: TransactionType,
        #[arg(long, value_parser = parse_amount)]
        amount: Decimal,
        #[arg(long)]
        category: String,
        /// Defaults to today. Formatted as YYYY-MM-DD.
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
        #[arg(long)]
        description: Option<String>,
        /// Repeat the transaction daily, weekly, monthly or yearly.
        #[arg(long)]
        recurring: Option<RecurringInterval>,
    },

    /// Set the owner's monthly budget.
    SetBudget {
        #[arg(long)]
        owner: String,
        #[arg(long, value_parser = parse_amount)]
        amount: Decimal,
    },

    /// Materialise every recurring transaction that is due.
    RunRecurring {
        /// Defaults to today. Formatted as YYYY-MM-DD.
        #[arg(long, value_parser = parse_date)]
        as_of: Option<Date>,
    },

    /// Deliver due budget alerts as JSON lines.
    CheckBudgets {
        /// Defaults to today. Formatted as YYYY-MM-DD.
        #[arg(long, value_parser = parse_date)]
        as_of: Option<Date>,
    },

    /// Summarise a calendar month.
    Report {
        #[arg(long)]
        owner: String,
        /// Any day in the month. Defaults to today.
        #[arg(long, value_parser = parse_date)]
        month_of: Option<Date>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    setup_logging(args.log_file.as_deref())?;

    let config = Config::new(&args.db_path, &args.timezone)?;
    let connection = db::open(&config.db_path)?;

    match args.command {
        Command::Init => {
            tracing::info!("initialised database at {:#?}", config.db_path);
        }
        Command::CreateAccount {
            owner,
            name,
            kind,
            opening_balance,
            default,
        } => {
            let account = create_account(
                &OwnerId::new(&owner),
                Account::build(&name, kind, opening_balance).is_default(default),
                &connection,
            )?;
            print_json(&account)?;
        }
        Command::SetDefault { owner, account_id } => {
            let account = set_default_account(&OwnerId::new(&owner), account_id, &connection)?;
            print_json(&account)?;
        }
        Command::Accounts { owner } => {
            let accounts = list_accounts(&OwnerId::new(&owner), &connection)?;
            print_json(&accounts)?;
        }
        Command::Record {
            owner,
            account_id,
            kind,
            amount,
            category,
            date,
            description,
            recurring,
        } => {
            let owner = OwnerId::new(&owner);
            let account_id = match account_id {
                Some(account_id) => account_id,
                None => get_default_account(&owner, &connection)?
                    .map(|account| account.id)
                    .ok_or("the owner has no accounts, pass --account-id or create one")?,
            };
            let date = match date {
                Some(date) => date,
                None => config.today()?,
            };

            let mut builder = Transaction::build(account_id, kind, amount, &category, date);
            if let Some(description) = description {
                builder = builder.description(&description);
            }
            if let Some(interval) = recurring {
                builder = builder.recurring(interval);
            }

            let transaction =
                record_transaction(&owner, builder, &DefaultCategories, &connection)?;
            print_json(&transaction)?;
        }
        Command::SetBudget { owner, amount } => {
            let budget = set_budget(&OwnerId::new(&owner), amount, &connection)?;
            print_json(&budget)?;
        }
        Command::RunRecurring { as_of } => {
            let as_of = match as_of {
                Some(as_of) => as_of,
                None => config.today()?,
            };
            let report = run_recurring(as_of, &DefaultCategories, &connection)?;
            print_json(&report)?;
        }
        Command::CheckBudgets { as_of } => {
            let as_of = match as_of {
                Some(as_of) => as_of,
                None => config.today()?,
            };
            let mut notifier = JsonLinesNotifier::new(std::io::stdout());
            let run = check_budget_alerts(as_of, &mut notifier, &connection)?;

            for failure in &run.failures {
                tracing::warn!(owner = %failure.owner_id, reason = %failure.reason, "budget check failed");
            }
            tracing::info!(
                %as_of,
                checked = run.checks.len(),
                failed = run.failures.len(),
                "checked budgets"
            );
        }
        Command::Report { owner, month_of } => {
            let month_of = match month_of {
                Some(month_of) => month_of,
                None => config.today()?,
            };
            let report = monthly_report(&OwnerId::new(&owner), month_of, &connection)?;
            print_json(&report)?;
        }
    }

    Ok(())
}

fn parse_date(text: &str) -> Result<Date, String> {
    Date::parse(text.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|error| format!("\"{text}\" is not a YYYY-MM-DD date: {error}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Log to stderr at the level set by `RUST_LOG` (default `info`), and at
/// debug level to `log_file` if one is given.
fn setup_logging(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let debug_log = match log_file {
        Some(path) => {
            let log_file = OpenOptions::new().create(true).append(true).open(path)?;

            Some(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(false)
                    .with_writer(Arc::new(log_file))
                    .with_filter(filter::LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_log)
        .with(debug_log)
        .init();

    Ok(())
}
