use crate::domain::alert::{AlertRule, ChannelKind};
use crate::domain::price::PriceContext;
use num_format::{Buffer, CustomFormat, Grouping};
use std::sync::OnceLock;

/// Indonesian convention: dot as the thousands separator, no decimals.
fn idr_format() -> &'static CustomFormat {
    static FORMAT: OnceLock<CustomFormat> = OnceLock::new();
    FORMAT.get_or_init(|| {
        CustomFormat::builder()
            .grouping(Grouping::Standard)
            .separator(".")
            .build()
            .expect("static IDR number format is valid")
    })
}

fn grouped(amount: f64) -> String {
    let mut buf = Buffer::default();
    buf.write_formatted(&(amount.round() as i64), idr_format());
    buf.to_string()
}

pub fn format_idr(amount: f64) -> String {
    format!("Rp {}", grouped(amount))
}

/// Day-over-day movement, always signed.
pub fn format_delta(amount: f64) -> String {
    if amount >= 0.0 {
        format!("+{}", grouped(amount))
    } else {
        grouped(amount)
    }
}

fn bold(kind: ChannelKind, text: &str) -> String {
    match kind {
        ChannelKind::Telegram => format!("<b>{text}</b>"),
        ChannelKind::Whatsapp => format!("*{text}*"),
    }
}

/// Threshold-crossing notification: names the alert type and the current
/// formatted price.
pub fn price_alert_message(kind: ChannelKind, rule: &AlertRule, ctx: &PriceContext) -> String {
    let current = format_idr(ctx.current.price_per_gram);
    match rule {
        AlertRule::Increase { target_price } => format!(
            "\u{1F514} {}\n\nGold price has risen to or above your target of {}.\n\nCurrent price: {}",
            bold(kind, "Price Increase Alert"),
            format_idr(*target_price),
            current,
        ),
        AlertRule::Decrease { target_price } => format!(
            "\u{1F514} {}\n\nGold price has fallen to or below your target of {}.\n\nCurrent price: {}",
            bold(kind, "Price Decrease Alert"),
            format_idr(*target_price),
            current,
        ),
        AlertRule::Daily { .. } => daily_summary_message(kind, ctx),
    }
}

/// Scheduled summary: current/buy/sell quotes plus the day-over-day delta.
pub fn daily_summary_message(kind: ChannelKind, ctx: &PriceContext) -> String {
    format!(
        "\u{1F4CA} {}\n\nCurrent Price: {} ({})\nBuy Price: {}\nSell Price: {}\n\nData source: {}",
        bold(kind, "Daily Gold Price Summary"),
        format_idr(ctx.current.price_per_gram),
        format_delta(ctx.price_change()),
        format_idr(ctx.current.buy_price),
        format_idr(ctx.current.sell_price),
        ctx.current.source,
    )
}
