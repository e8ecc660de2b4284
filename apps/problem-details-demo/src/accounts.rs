//! The "out of credit" example from RFC 7807, section 3.

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use problem_details::Problem;
use serde::Deserialize;

pub const OUT_OF_CREDIT: &str = "https://example.com/probs/out-of-credit";

/// Every account has the same balance in this demo.
const BALANCE: f64 = 30.0;
const RELATED_ACCOUNTS: [u64; 2] = [12345, 67890];

#[derive(Debug, Deserialize)]
pub struct Purchase {
    pub price: f64,
}

/// `POST /accounts/{account}?price=N`
///
/// # Errors
/// Returns a 403 problem when the price exceeds the account balance.
pub async fn purchase(
    Path(account): Path<u64>,
    Query(purchase): Query<Purchase>,
) -> Result<StatusCode, Problem> {
    verify_funds(account, purchase.price)?;
    tracing::info!(account, price = purchase.price, "purchase accepted");
    Ok(StatusCode::NO_CONTENT)
}

fn verify_funds(account: u64, price: f64) -> Result<(), Problem> {
    if price <= BALANCE {
        return Ok(());
    }
    let accounts: Vec<String> = RELATED_ACCOUNTS.iter().copied().map(account_url).collect();
    Err(Problem::new(403)
        .with_type(OUT_OF_CREDIT)
        .with_title("You do not have enough credit.")
        .with_detail(format!(
            "Your current balance is {BALANCE}, but that costs {price}"
        ))
        .with_instance(account_url(account))
        .with_field("balance", &BALANCE)
        .with_field("accounts", &accounts)
        .with_log_message(format!("account {account} is short of credit")))
}

fn account_url(account: u64) -> String {
    format!("/accounts/{account}")
}
