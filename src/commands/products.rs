//! Price tracking commands: /track, /tracked, /untrack.
//!
//! Prices are whatever the user reports; fetching live prices is out of scope.

use super::{args, pick, pipe_fields, user_error, CommandContext};
use taskflow_core::error::TaskflowError;
use taskflow_memory::NewProduct;

/// `"₹1,299.50"` → 1299.5.
pub(crate) fn parse_price(raw: &str) -> Option<f64> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok().filter(|p: &f64| p.is_finite() && *p >= 0.0)
}

/// `1299.5` → `"₹1,300"`.
pub(crate) fn format_price(price: f64) -> String {
    let whole = price.round() as u64;
    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("₹{grouped}")
}

pub(super) async fn handle_track(ctx: &CommandContext<'_>) -> String {
    let fields = pipe_fields(args(ctx.text));
    if fields.len() < 3 || fields.len() > 4 || fields[0].is_empty() {
        return "Usage: /track <title> | <url> | <price> [| <target price>]".to_string();
    }
    let Some(current_price) = parse_price(fields[2]) else {
        return format!("\"{}\" doesn't look like a price.", fields[2]);
    };
    let target_price = match fields.get(3) {
        Some(raw) => match parse_price(raw) {
            Some(p) => Some(p),
            None => return format!("\"{raw}\" doesn't look like a price."),
        },
        None => None,
    };

    let product = NewProduct {
        title: fields[0].to_string(),
        url: fields[1].to_string(),
        current_price: Some(current_price),
        target_price,
    };
    match ctx.store.add_tracked_product(ctx.user_id, product).await {
        Ok(_) => {
            let mut out = format!(
                "📦 Now tracking {} at {}",
                fields[0],
                format_price(current_price)
            );
            if let Some(target) = target_price {
                out.push_str(&format!("\n📉 I'll flag it below {}", format_price(target)));
            }
            out
        }
        Err(e) => user_error(&e),
    }
}

pub(super) async fn handle_tracked(ctx: &CommandContext<'_>) -> String {
    let products = ctx.store.get_tracked_products(ctx.user_id).await;
    if products.is_empty() {
        return "You're not tracking any products.".to_string();
    }
    let mut out = String::from("🛒 Tracked products:\n");
    for (i, p) in products.iter().enumerate() {
        let price = p
            .current_price
            .map(format_price)
            .unwrap_or_else(|| "N/A".to_string());
        out.push_str(&format!("\n{}. {} ({price})", i + 1, p.title));
        if let Some(target) = p.target_price {
            out.push_str(&format!("\n   📉 Alert if below {}", format_price(target)));
        }
        if !p.url.is_empty() {
            out.push_str(&format!("\n   🔗 {}", p.url));
        }
    }
    out
}

pub(super) async fn handle_untrack(ctx: &CommandContext<'_>) -> String {
    let target = args(ctx.text);
    if target.is_empty() {
        return "Usage: /untrack <number or id>".to_string();
    }
    let products = ctx.store.get_tracked_products(ctx.user_id).await;
    let product = match pick(&products, target, |p| p.id.as_str(), "product") {
        Ok(p) => p,
        Err(e) => return user_error(&e),
    };
    match ctx.store.remove_tracked_product(ctx.user_id, &product.id).await {
        Ok(true) => format!("🗑 Stopped tracking {}", product.title),
        Ok(false) => user_error(&TaskflowError::Validation(
            "I couldn't find that product.".into(),
        )),
        Err(e) => user_error(&e),
    }
}
