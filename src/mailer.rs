//! Transactional email.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;

use crate::{config::MailConfig, models::Order};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub fn from_config(config: Option<&MailConfig>) -> anyhow::Result<Arc<dyn Mailer>> {
    match config {
        Some(config) => Ok(Arc::new(HttpMailer::new(config)?)),
        None => {
            tracing::info!("mail provider not configured, emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Sends through a provider that accepts `{from, to, subject, html}` as JSON.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let body = SendRequest {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
        };
        let response = self.client.post(&self.api_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "email not sent, mail provider disabled");
        Ok(())
    }
}

pub fn order_confirmation(order: &Order) -> Email {
    Email {
        to: order.shipping_email.clone(),
        subject: format!("Order #{} received", order.id),
        html: format!(
            "<p>Hi {name},</p>\
             <p>We received your order <strong>#{id}</strong> totalling <strong>{total}</strong>.</p>\
             <p>Payment method: {payment}. We will ship to:<br>{address}</p>",
            name = html_escape(&order.shipping_name),
            id = order.id,
            total = order.total,
            payment = html_escape(&order.payment_type),
            address = html_escape(&order.shipping_address),
        ),
    }
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::sea_orm_active_enums::OrderStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn order() -> Order {
        Order {
            id: 42,
            user_id: 1,
            shipping_name: "Ada <Admin>".into(),
            shipping_address: "1 Crab Street".into(),
            shipping_phone: "0800".into(),
            shipping_email: "ada@example.com".into(),
            status: OrderStatus::Pending,
            payment_type: "bank_transfer".into(),
            payment_proof: None,
            shipping_bill_url: None,
            total: Decimal::new(2000000, 2),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn confirmation_is_addressed_to_shipping_email() {
        let email = order_confirmation(&order());
        assert_eq!(email.to, "ada@example.com");
        assert_eq!(email.subject, "Order #42 received");
        assert!(email.html.contains("20000.00"));
    }

    #[test]
    fn confirmation_escapes_customer_input() {
        let email = order_confirmation(&order());
        assert!(email.html.contains("Ada &lt;Admin&gt;"));
        assert!(!email.html.contains("<Admin>"));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.send(order_confirmation(&order())).await.is_ok());
    }
}
