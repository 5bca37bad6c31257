use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info, warn};

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, recipients: &[String], html_body: &str)
        -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("smtp relay")?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        let from = cfg.from.parse().context("parse MAIL_FROM")?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        subject: &str,
        recipients: &[String],
        html_body: &str,
    ) -> anyhow::Result<()> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for to in recipients {
            let mailbox: Mailbox = to
                .parse()
                .with_context(|| format!("invalid recipient {}", to))?;
            builder = builder.to(mailbox);
        }
        let message = builder
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .context("build email")?;
        self.transport.send(message).await.context("smtp send")?;
        debug!(recipients = recipients.len(), "email sent");
        Ok(())
    }
}

/// Used when no SMTP relay is configured.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, subject: &str, recipients: &[String], _html: &str) -> anyhow::Result<()> {
        info!(%subject, recipients = recipients.len(), "smtp not configured; email skipped");
        Ok(())
    }
}

/// Fire-and-forget delivery. Failures are logged and never reach the caller.
pub fn dispatch(mailer: Arc<dyn Mailer>, subject: String, recipients: Vec<String>, body: String) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&subject, &recipients, &body).await {
            warn!(error = ?e, %subject, "email dispatch failed");
        }
    });
}

/// Escape text for interpolation into HTML element content or a quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

pub fn ticket_email(user_name: &str, event_name: &str, qr_url: &str, unlock_token: &str) -> (String, String) {
    let subject = format!("Eii Chalé! You're All Set for {event_name} 🎉");
    let first_name = escape_html(user_name.split_whitespace().next().unwrap_or(user_name));
    let event_name = escape_html(event_name);
    let qr_url = escape_html(qr_url);
    let unlock_token = escape_html(unlock_token);
    let body = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Your Ticket for {event_name}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 10px;">
        <h2 style="color: #ff6600; text-align: center;">Hello, {first_name}</h2>
        <p>Your ticket for <strong>{event_name}</strong> is ready and you're on the list.</p>
        <ul style="list-style-type: none; padding: 0;">
            <li><strong>QR Code:</strong> <a href="{qr_url}" style="color: #ff6600;">{qr_url}</a></li>
            <li><strong>Unlock Code for PDF Ticket:</strong> <em>{unlock_token}</em></li>
        </ul>
        <p>Show the QR code at the gate and you're in.</p>
        <p style="text-align: center;">See you there!<br><strong>The Chalé Team</strong></p>
    </div>
</body>
</html>"#
    );
    (subject, body)
}
