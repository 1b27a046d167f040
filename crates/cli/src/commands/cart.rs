//! Cart commands.

use tradepost_core::{Price, ProductId};
use tradepost_storefront::SyncOutcome;

use super::{CliError, State};

/// Print the cart lines and totals.
#[allow(clippy::print_stdout)]
pub fn show(state: &State) {
    let snapshot = state.cart().snapshot();
    let currency = state.config().currency;

    if snapshot.items.is_empty() {
        println!("Your cart is empty.");
        return;
    }

    for item in &snapshot.items {
        println!(
            "{:>4} x {:<32} {:>12} {:>12}  ({})",
            item.quantity(),
            item.name(),
            Price::new(item.price(), currency).display(),
            Price::new(item.total(), currency).display(),
            item.product_id(),
        );
    }
    println!();
    println!("Items:    {}", snapshot.item_count);
    println!(
        "Subtotal: {}",
        Price::new(snapshot.totals.subtotal, currency).display()
    );
    println!(
        "VAT {}: {}",
        state.cart().vat_rate(),
        Price::new(snapshot.totals.vat, currency).display()
    );
    println!(
        "Total:    {}",
        Price::new(snapshot.totals.grand_total, currency).display()
    );

    let pending = state.cart().pending_sync();
    if !pending.is_empty() {
        println!();
        println!("Local changes not yet sent to the store; run `tp-cli cart sync`.");
    }
}

pub async fn add(state: &State, product: String, quantity: u32) -> Result<(), CliError> {
    match state.cart().add_item(ProductId::new(product), quantity).await? {
        SyncOutcome::Applied => tracing::info!("Added to cart"),
        SyncOutcome::Discarded => tracing::info!("Cart changed while adding; response ignored"),
    }
    show(state);
    Ok(())
}

pub fn remove(state: &State, product: String) {
    let product_id = ProductId::new(product);
    match state.cart().remove_from_cart(&product_id) {
        Some(item) => tracing::info!(product_id = %product_id, "Removed {}", item.name()),
        None => tracing::info!(product_id = %product_id, "Product is not in the cart"),
    }
    show(state);
}

pub async fn clear(state: &State) -> Result<(), CliError> {
    state.cart().empty_cart().await?;
    tracing::info!("Cart emptied");
    show(state);
    Ok(())
}

pub async fn sync(state: &State) -> Result<(), CliError> {
    state.cart().rehydrate().await?;
    tracing::info!("Cart synced with the store");
    show(state);
    Ok(())
}
