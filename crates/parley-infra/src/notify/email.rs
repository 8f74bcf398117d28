//! SMTP notification sink and chat transcripts, via lettre.
//!
//! Building the transport does not open a connection; each send connects on
//! demand. Message bodies are HTML with every user-supplied string escaped.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use parley_core::notify::sink::NotificationSink;
use parley_core::notify::transcript::format_transcript;
use parley_types::chat::ChatMessage;
use parley_types::config::EmailConfig;
use parley_types::error::NotifyError;
use parley_types::notification::ExchangeRecord;

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Sends exchange notifications to the operator and transcripts to visitors.
pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    notify_to: Option<Mailbox>,
}

impl EmailSink {
    pub fn new(config: &EmailConfig, password: Option<SecretString>) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from)?;
        let notify_to = config
            .to
            .as_deref()
            .filter(|to| !to.trim().is_empty())
            .map(parse_mailbox)
            .transpose()?;

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| NotifyError::Delivery(format!("invalid SMTP host {}: {e}", config.host)))?;

        let mut builder = builder.port(config.port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(username), Some(password)) = (&config.username, password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        info!(host = %config.host, port = config.port, "Email sink initialized");
        Ok(Self {
            transport: builder.build(),
            from,
            notify_to,
        })
    }

    /// Email a visitor the transcript of their session.
    ///
    /// Unlike exchange notifications, failures are returned to the caller.
    pub async fn send_transcript(
        &self,
        to: &str,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), NotifyError> {
        let to = parse_mailbox(to)?;
        let html = render_transcript(session_id, messages, Utc::now());
        self.send(to.clone(), "Chat Transcript", html).await?;
        info!(session_id, to = %to.email, "Transcript sent");
        Ok(())
    }

    /// Check that the SMTP server accepts a connection.
    pub async fn verify(&self) -> Result<bool, NotifyError> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }

    async fn send(&self, to: Mailbox, subject: &str, html: String) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| NotifyError::Delivery(format!("failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }
}

impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, record: &ExchangeRecord) -> Result<(), NotifyError> {
        let Some(to) = &self.notify_to else {
            debug!("No notification recipient configured, skipping email");
            return Ok(());
        };

        let subject = format!("New Chat Message - {}", record.company_name);
        self.send(to.clone(), &subject, render_notification(record)).await
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress(format!("{address}: {e}")))
}

pub(crate) fn render_notification(record: &ExchangeRecord) -> String {
    format!(
        "<h2>New Chat Message Received</h2>\n\
         <p><strong>Session ID:</strong> {session}</p>\n\
         <p><strong>Time:</strong> {time}</p>\n\
         <h3>User Message:</h3>\n<p>{user}</p>\n\
         <h3>Bot Reply:</h3>\n<p>{reply}</p>\n\
         <hr>\n<p style=\"color: #666; font-size: 12px;\">\
         This is an automated notification from your AI chatbot system.</p>\n",
        session = escape_html(&record.session_id),
        time = record.occurred_at.format("%Y-%m-%d %H:%M:%S UTC"),
        user = escape_html(&record.user_message),
        reply = escape_html(&record.reply),
    )
}

pub(crate) fn render_transcript(
    session_id: &str,
    messages: &[ChatMessage],
    now: DateTime<Utc>,
) -> String {
    format!(
        "<h2>Your Chat Transcript</h2>\n\
         <p><strong>Session ID:</strong> {session}</p>\n\
         <p><strong>Date:</strong> {date}</p>\n<hr>\n\
         <pre style=\"font-family: monospace; background: #f5f5f5; padding: 15px; border-radius: 5px;\">\
         {transcript}</pre>\n<hr>\n\
         <p style=\"color: #666; font-size: 12px;\">Thank you for chatting with us!</p>\n",
        session = escape_html(session_id),
        date = now.format("%Y-%m-%d %H:%M:%S UTC"),
        transcript = escape_html(&format_transcript(messages)),
    )
}

fn escape_html(text: &str) -> String {
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
