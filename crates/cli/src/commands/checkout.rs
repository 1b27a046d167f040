//! Checkout commands.

use tradepost_core::Price;
use tradepost_storefront::checkout::{CheckoutIntent, CheckoutResult, SubmitOutcome};

use super::{CliError, State};

pub async fn order(state: &State, shipping_method: String) -> Result<(), CliError> {
    let result = submit(state, CheckoutIntent::Order { shipping_method }).await?;

    if let Some(order) = state.checkout().last_order() {
        let total = Price::new(order.total_amount, state.config().currency);
        print_line(&format!(
            "Order {} placed ({}), total {}",
            order.id,
            order.status,
            total.display()
        ));
    } else if let Some(order_id) = result.order_id {
        print_line(&format!("Order {order_id} placed"));
    }
    Ok(())
}

pub async fn quote(state: &State, notes: String) -> Result<(), CliError> {
    submit(state, CheckoutIntent::Quote { notes }).await?;

    match state.checkout().last_quote() {
        Some(quote) => print_line(&format!(
            "Quote {} submitted ({}); we'll be in touch.",
            quote.id, quote.status
        )),
        None => print_line("Quote submitted; we'll be in touch."),
    }
    Ok(())
}

async fn submit(state: &State, intent: CheckoutIntent) -> Result<CheckoutResult, CliError> {
    match state.checkout().submit(intent).await {
        SubmitOutcome::Completed(result) if result.is_success() => Ok(result),
        SubmitOutcome::Completed(result) => Err(CliError::Checkout(
            result.error.unwrap_or_else(|| "unknown error".to_string()),
        )),
        SubmitOutcome::LoginRequired => Err(CliError::LoginRequired),
        SubmitOutcome::AlreadySubmitting => Err(CliError::AlreadySubmitting),
    }
}

#[allow(clippy::print_stdout)]
fn print_line(line: &str) {
    println!("{line}");
}
