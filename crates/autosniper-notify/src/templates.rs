//! Messaging-bot message templates (Markdown).

use crate::event::ListingSummary;

/// Items listed in a batch message before the remainder line.
pub const BATCH_PREVIEW_LIMIT: usize = 5;

/// Format a TL amount with `.` thousands separators and no decimals,
/// e.g. `1500000.0` → `1.500.000`.
#[must_use]
pub fn format_price(amount: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if rounded < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// "N new listings matched filter F" summary, showing the first five.
#[must_use]
pub fn new_listings_batch(filter_name: &str, total: usize, listings: &[ListingSummary]) -> String {
    let mut message = format!("🚗 *{filter_name}* filtrenizde *{total}* yeni ilan bulundu!\n\n");

    for (i, listing) in listings.iter().take(BATCH_PREVIEW_LIMIT).enumerate() {
        let title = if listing.title.is_empty() {
            "İlan"
        } else {
            listing.title.as_str()
        };
        message.push_str(&format!("*{}.* {title}\n", i + 1));
        message.push_str(&format!("   💰 {} TL\n", format_price(listing.price)));
        if !listing.source_url.is_empty() {
            message.push_str(&format!("   🔗 [İlana Git]({})\n", listing.source_url));
        }
        message.push('\n');
    }

    if total > BATCH_PREVIEW_LIMIT {
        message.push_str(&format!(
            "_... ve {} ilan daha_\n\n",
            total - BATCH_PREVIEW_LIMIT
        ));
    }

    message.push_str("📱 Detaylar için uygulamayı açın.");
    message
}

/// Price-drop alert for a tracked listing.
#[must_use]
pub fn price_drop(title: &str, old_price: f64, new_price: f64, url: &str) -> String {
    let change = old_price - new_price;
    let change_pct = if old_price > 0.0 {
        change / old_price * 100.0
    } else {
        0.0
    };

    let mut message = String::from("📉 *Fiyat Düşüşü!*\n\n");
    message.push_str(&format!("🚗 {title}\n\n"));
    message.push_str(&format!(
        "💰 ~{} TL~ → *{} TL*\n",
        format_price(old_price),
        format_price(new_price)
    ));
    message.push_str(&format!(
        "📉 *{} TL* indirim (-%{change_pct:.1})\n\n",
        format_price(change)
    ));
    if !url.is_empty() {
        message.push_str(&format!("🔗 [İlana Git]({url})"));
    }
    message
}

/// Confirmation sent when an owner links a chat.
#[must_use]
pub fn channel_test() -> String {
    [
        "🎉 *Tebrikler!*",
        "",
        "Telegram bildirimleriniz başarıyla yapılandırıldı.",
        "",
        "Artık şu bildirimleri alacaksınız:",
        "• 🆕 Yeni ilan bildirimleri",
        "• 📉 Fiyat düşüşü bildirimleri",
        "",
        "🚗 _AutoSniper_",
    ]
    .join("\n")
}
