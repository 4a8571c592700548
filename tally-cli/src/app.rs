use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tally_config::{LedgerSettings, Settings};
use tally_core::{AccountNumber, AccountType};
use tally_ledger::{Ledger, LedgerConfig};
use tally_store::TransactionQuery;

use crate::telemetry;

#[derive(Parser)]
#[command(name = "tally", version, about = "Tally banking ledger engine")]
pub struct Cli {
    /// Path to a TOML settings file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a new account for a user.
    Open {
        user: String,
        account_type: AccountType,
        #[arg(default_value = "0")]
        balance: Decimal,
    },
    /// Credit an amount onto an account.
    Deposit {
        account: String,
        amount: Decimal,
        #[arg(default_value = "deposit")]
        description: String,
    },
    /// Debit an amount from an account.
    Withdraw {
        account: String,
        amount: Decimal,
        #[arg(default_value = "withdrawal")]
        description: String,
    },
    /// Move an amount between two accounts.
    Transfer {
        from: String,
        to: String,
        amount: Decimal,
        #[arg(default_value = "transfer")]
        description: String,
    },
    /// Close an account holding a zero balance.
    Close {
        account: String,
        #[arg(default_value = "closed by operator")]
        reason: String,
    },
    /// Print recent transactions for an account, newest first.
    History {
        account: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Reset every expired limit window.
    SweepLimits,
    /// Post one month of interest onto an account.
    Accrue { account: String },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init();

    let settings = Settings::load(cli.config.as_deref())?;
    let ledger = Ledger::open(
        &settings.database.path,
        ledger_config(&settings.ledger),
    )?;

    match cli.command {
        Command::Open {
            user,
            account_type,
            balance,
        } => {
            let account = ledger.open_account(user.into(), account_type, balance)?;
            println!(
                "opened {} ({}) balance {} {}",
                account.number, account.account_type, account.balance, account.currency
            );
        }
        Command::Deposit {
            account,
            amount,
            description,
        } => {
            let receipt = ledger.deposit(&AccountNumber::from(account), amount, &description)?;
            println!(
                "deposit tx {} ref {} balance {}",
                receipt.transaction_id, receipt.reference, receipt.balance
            );
        }
        Command::Withdraw {
            account,
            amount,
            description,
        } => {
            let receipt = ledger.withdraw(&AccountNumber::from(account), amount, &description)?;
            println!(
                "withdrawal tx {} ref {} balance {}",
                receipt.transaction_id, receipt.reference, receipt.balance
            );
        }
        Command::Transfer {
            from,
            to,
            amount,
            description,
        } => {
            let receipt = ledger.transfer(
                &AccountNumber::from(from),
                &AccountNumber::from(to),
                amount,
                &description,
            )?;
            println!(
                "transfer ref {} from-balance {} to-balance {}",
                receipt.reference, receipt.from_balance, receipt.to_balance
            );
        }
        Command::Close { account, reason } => {
            ledger.close_account(&AccountNumber::from(account), &reason)?;
            println!("account closed");
        }
        Command::History { account, limit } => {
            let rows = ledger.history(
                &TransactionQuery::default()
                    .with_account(AccountNumber::from(account))
                    .with_limit(limit),
            )?;
            for tx in rows {
                println!(
                    "{} {} {} {} -> {} ({}) ref {}",
                    tx.id,
                    tx.tx_type,
                    tx.amount,
                    tx.balance_before,
                    tx.balance_after,
                    tx.status,
                    tx.reference
                );
            }
        }
        Command::SweepLimits => {
            let count = ledger.sweep_limits(Utc::now())?;
            println!("{count} limit window(s) reset");
        }
        Command::Accrue { account } => {
            match ledger.post_interest(&AccountNumber::from(account))? {
                Some(receipt) => println!(
                    "interest tx {} balance {}",
                    receipt.transaction_id, receipt.balance
                ),
                None => println!("nothing accrued"),
            }
        }
    }
    Ok(())
}

fn ledger_config(settings: &LedgerSettings) -> LedgerConfig {
    LedgerConfig {
        account_prefix: settings.account_prefix.clone(),
        currency: settings.currency.clone(),
        lock_timeout: Duration::from_millis(settings.lock_timeout_ms),
        large_deposit_threshold: settings.large_deposit_threshold,
        low_balance_threshold: settings.low_balance_threshold,
        default_overdraft: settings.default_overdraft,
        savings_interest_rate: settings.savings_interest_rate,
        business_interest_rate: settings.business_interest_rate,
        daily_withdrawal_cap: settings.daily_withdrawal_cap,
        daily_transfer_cap: settings.daily_transfer_cap,
        single_transaction_cap: settings.single_transaction_cap,
    }
}
