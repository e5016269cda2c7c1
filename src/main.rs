//! Wallet Transaction Engine CLI
//!
//! Submits one transfer or swap and tracks it to a terminal outcome.
//!
//! ```text
//! wallet_tx_engine [--env dev] send --to <addr> --amount 1.5 --decimals 9 [--token <mint>]
//! wallet_tx_engine [--env dev] swap --from <mint|native> --to-token <mint> --amount 10 \
//!                                   --decimals 6 --quote <id> [--slippage 0.5]
//! ```
//!
//! Session flags `--device`, `--wallet`, `--chain` override `session:` in
//! the config file. The payment password is read from
//! `WALLET_PAYMENT_PASSWORD`; `--action` pins the idempotency action id
//! (default: a fresh ULID, i.e. a new user action).

use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;

use wallet_tx_engine::config::AppConfig;
use wallet_tx_engine::execution::{
    Chain, EngineContext, HttpBackend, IdempotencyRegistry, Outcome, TokenRef, TransactionEngine,
    TransferIntent,
};
use wallet_tx_engine::money;

const PASSWORD_ENV: &str = "WALLET_PAYMENT_PASSWORD";

// ============================================================
// ARGUMENTS
// ============================================================

fn get_arg(args: &[String], names: &[&str]) -> Option<String> {
    args.iter()
        .position(|a| names.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn require_arg(args: &[String], name: &str) -> Result<String> {
    get_arg(args, &[name]).ok_or_else(|| anyhow!("missing required argument {}", name))
}

fn get_env(args: &[String]) -> String {
    get_arg(args, &["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn parse_token(raw: &str) -> TokenRef {
    if raw.eq_ignore_ascii_case("native") {
        TokenRef::Native
    } else {
        TokenRef::Address(raw.to_string())
    }
}

fn build_context(args: &[String], config: &AppConfig) -> Result<EngineContext> {
    let session = config.session.as_ref();

    let device_id = get_arg(args, &["--device"])
        .or_else(|| session.map(|s| s.device_id.clone()))
        .context("no device id: pass --device or set session.device_id")?;
    let wallet_id = get_arg(args, &["--wallet"])
        .or_else(|| session.map(|s| s.wallet_id.clone()))
        .context("no wallet id: pass --wallet or set session.wallet_id")?;
    let chain = match get_arg(args, &["--chain"]) {
        Some(raw) => raw.parse::<Chain>()?,
        None => session
            .map(|s| s.chain)
            .context("no chain: pass --chain or set session.chain")?,
    };
    let secret = std::env::var(PASSWORD_ENV)
        .with_context(|| format!("{} is not set", PASSWORD_ENV))?;

    Ok(EngineContext::new(device_id, wallet_id, chain, secret))
}

fn build_intent(args: &[String]) -> Result<TransferIntent> {
    let command = args
        .iter()
        .skip(1)
        .find(|a| *a == "send" || *a == "swap")
        .ok_or_else(|| anyhow!("expected a command: send | swap"))?;

    let amount = require_arg(args, "--amount")?;
    let decimals: u32 = require_arg(args, "--decimals")?
        .parse()
        .context("--decimals must be an integer")?;
    let action = get_arg(args, &["--action"]).unwrap_or_else(|| ulid::Ulid::new().to_string());

    match command.as_str() {
        "send" => {
            let token = get_arg(args, &["--token"])
                .map(|t| parse_token(&t))
                .unwrap_or(TokenRef::Native);
            let to = require_arg(args, "--to")?;
            Ok(TransferIntent::transfer(token, amount, decimals, to, action))
        }
        "swap" => {
            let from = parse_token(&require_arg(args, "--from")?);
            let to = parse_token(&require_arg(args, "--to-token")?);
            let quote = require_arg(args, "--quote")?;
            let slippage = get_arg(args, &["--slippage"]).unwrap_or_else(|| "0.5".to_string());
            let slippage_bps = money::percent_to_bps(&slippage)
                .ok_or_else(|| anyhow!("--slippage must be a percent between 0 and 100"))?;
            Ok(TransferIntent::swap(
                from,
                to,
                amount,
                decimals,
                quote,
                Some(slippage_bps),
                action,
            ))
        }
        other => bail!("unknown command {}", other),
    }
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let env = get_env(&args);
    let app_config = AppConfig::load(&env)?;
    let log_guard = wallet_tx_engine::logging::init_logging(&app_config);

    tracing::info!("Starting wallet_tx_engine in {} mode", env);

    let ctx = Arc::new(build_context(&args, &app_config)?);
    let intent = build_intent(&args)?;
    let decimals = intent.token_decimals;

    let backend = Arc::new(HttpBackend::new(&app_config.backend)?);
    let registry = Arc::new(IdempotencyRegistry::with_retention(
        app_config.tracker.key_retention(),
    ));
    let engine = TransactionEngine::new(ctx, backend, registry, app_config.tracker.clone());

    let handle = engine.start(intent.clone());
    tracing::info!(key = ?handle.key(), "Intent started");

    let outcome = tokio::select! {
        outcome = handle.outcome() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; cancelling");
            handle.cancel();
            None
        }
    };

    let shown_amount = money::to_base_units(&intent.human_amount, decimals)
        .and_then(|base| money::from_base_units(&base, decimals))
        .unwrap_or_else(|| intent.human_amount.clone());

    let exit_code = match outcome {
        Some(Outcome::Confirmed(record)) => {
            tracing::info!(record = %record, "Confirmed");
            println!(
                "CONFIRMED {} ({})",
                shown_amount,
                record.reference.as_deref().unwrap_or("-")
            );
            0
        }
        Some(Outcome::Failed { reason, .. }) => {
            tracing::error!(code = reason.code(), reason = %reason, "Failed");
            println!("FAILED: {}", reason);
            1
        }
        Some(Outcome::Timeout(record)) => {
            tracing::warn!(record = %record, "Unresolved");
            let recheck = engine.recheck(&record).await;
            println!(
                "TIMEOUT: outcome unknown after {} polls (re-check: {:?})",
                record.attempt_count, recheck
            );
            2
        }
        None => {
            println!("CANCELLED");
            130
        }
    };

    if exit_code != 0 {
        drop(log_guard);
        std::process::exit(exit_code);
    }
    Ok(())
}
