//! Transactional email templates.
//!
//! Every interpolated value goes through [`escape_html`] in the HTML part.
//! The text part is sent as-is.

use atelier_schemas::{Artisan, CodePurpose, CustomOrder, Order, TradeIn};
use uuid::Uuid;

use crate::EmailMessage;

/// Market-wide values every template needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub market_name: String,
    pub currency: String,
    /// Storefront origin used for links, without trailing slash.
    pub public_base_url: String,
}

impl Branding {
    fn link(&self, path: &str) -> String {
        format!("{}{}", self.public_base_url.trim_end_matches('/'), path)
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render(b: &Branding, to: &str, subject: String, paragraphs: &[String]) -> EmailMessage {
    let mut html = String::from("<!doctype html><html><body style=\"font-family:sans-serif\">");
    html.push_str(&format!("<h2>{}</h2>", escape_html(&b.market_name)));
    for p in paragraphs {
        html.push_str(&format!("<p>{}</p>", escape_html(p)));
    }
    html.push_str("</body></html>");

    let mut text = paragraphs.join("\n\n");
    text.push_str(&format!("\n\n-- {}", b.market_name));

    EmailMessage {
        to: to.to_string(),
        subject: format!("{}: {}", b.market_name, subject),
        html,
        text,
    }
}

fn short(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

pub fn verification_code(b: &Branding, to: &str, purpose: CodePurpose, code: &str, ttl_minutes: i64) -> EmailMessage {
    let what = match purpose {
        CodePurpose::ArtisanEmail => "confirm your artisan account",
        CodePurpose::CustomerEmail => "confirm your email address",
    };
    render(
        b,
        to,
        "your verification code".to_string(),
        &[
            format!("Use the code {code} to {what}."),
            format!("It expires in {ttl_minutes} minutes and can be used once."),
        ],
    )
}

pub fn order_placed(b: &Branding, to: &str, order: &Order) -> EmailMessage {
    let mut lines: Vec<String> = order
        .lines
        .iter()
        .map(|l| format!("{} x {} at {} {}", l.quantity, l.name, l.unit_price, b.currency))
        .collect();
    lines.insert(0, format!("Thank you, we received order {}.", short(order.id)));
    lines.push(format!("Total due: {} {}", order.total, b.currency));
    lines.push(format!(
        "Upload your payment proof at {}",
        b.link(&format!("/orders/{}", order.id))
    ));
    render(b, to, format!("order {} received", short(order.id)), &lines)
}

pub fn payment_confirmed(b: &Branding, to: &str, order: &Order) -> EmailMessage {
    render(
        b,
        to,
        format!("payment confirmed for order {}", short(order.id)),
        &[
            format!("We confirmed your payment of {} {}.", order.total, b.currency),
            "The artisans have been notified and will prepare your pieces.".to_string(),
        ],
    )
}

pub fn payment_proof_rejected(b: &Branding, to: &str, order_id: Uuid, note: Option<&str>) -> EmailMessage {
    let mut paragraphs = vec![format!(
        "We could not accept the payment proof for order {}.",
        short(order_id)
    )];
    if let Some(note) = note {
        paragraphs.push(format!("Reviewer note: {note}"));
    }
    paragraphs.push(format!(
        "You can upload a new proof at {}",
        b.link(&format!("/orders/{order_id}"))
    ));
    render(b, to, format!("payment proof for order {} rejected", short(order_id)), &paragraphs)
}

pub fn order_failed(b: &Branding, to: &str, order: &Order) -> EmailMessage {
    render(
        b,
        to,
        format!("order {} cancelled", short(order.id)),
        &[
            "We could not confirm payment for your order, so it has been cancelled.".to_string(),
            "Any store credit used has been returned to your account.".to_string(),
        ],
    )
}

pub fn custom_order_quoted(b: &Branding, to: &str, co: &CustomOrder) -> EmailMessage {
    let mut paragraphs = vec![format!(
        "The artisan quoted {} {} with a lead time of {} days for your request.",
        co.quote.unwrap_or_default(),
        b.currency,
        co.lead_time_days.unwrap_or_default()
    )];
    if let Some(note) = &co.artisan_note {
        paragraphs.push(format!("Note from the artisan: {note}"));
    }
    paragraphs.push(format!(
        "Review and accept at {}",
        b.link(&format!("/custom-orders/{}", co.id))
    ));
    render(b, to, "your custom order has a quote".to_string(), &paragraphs)
}

pub fn custom_order_status(b: &Branding, to: &str, co: &CustomOrder) -> EmailMessage {
    let status = co.status.as_str().replace('_', " ");
    render(
        b,
        to,
        format!("custom order {} is now {status}", short(co.id)),
        &[
            format!("Your custom order {} moved to: {status}.", short(co.id)),
            b.link(&format!("/custom-orders/{}", co.id)),
        ],
    )
}

pub fn artisan_approved(b: &Branding, artisan: &Artisan) -> EmailMessage {
    render(
        b,
        &artisan.email,
        "your artisan account is active".to_string(),
        &[
            format!("Welcome, {}. Your shop is approved.", artisan.display_name),
            format!("Start listing pieces at {}", b.link("/artisan")),
        ],
    )
}

pub fn artisan_suspended(b: &Branding, artisan: &Artisan) -> EmailMessage {
    render(
        b,
        &artisan.email,
        "your artisan account is suspended".to_string(),
        &[
            format!("{}, your shop has been suspended and its pieces are hidden.", artisan.display_name),
            "Reply to this email to reach the back office.".to_string(),
        ],
    )
}

pub fn trade_in_offer(b: &Branding, to: &str, t: &TradeIn) -> EmailMessage {
    let mut paragraphs = vec![format!(
        "We can offer {} {} in store credit for \"{}\".",
        t.offered_credit.unwrap_or_default(),
        b.currency,
        t.title
    )];
    if let Some(note) = &t.admin_note {
        paragraphs.push(note.clone());
    }
    paragraphs.push(format!(
        "Accept or decline at {}",
        b.link(&format!("/trade-ins/{}", t.id))
    ));
    render(b, to, "a trade-in offer for you".to_string(), &paragraphs)
}

pub fn concierge_reply(b: &Branding, to: &str, body: &str) -> EmailMessage {
    render(
        b,
        to,
        "the concierge replied".to_string(),
        &[
            body.to_string(),
            format!("Continue the conversation at {}", b.link("/concierge")),
        ],
    )
}
