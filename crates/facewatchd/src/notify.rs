//! Alert delivery.
//!
//! [`Dispatcher`] is the daemon's [`AlertSink`]: it renders the alert into an
//! [`AlertMessage`] and hands it to a [`Transport`] on a spawned task, so the
//! detection cycle never waits on the network.

use crate::config::{NotifyConfig, TransportKind};
use chrono::{DateTime, Local};
use facewatch_core::{Alert, AlertSink};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub const EMAILJS_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A rendered notification, ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub recipient_name: String,
    pub recipient_email: String,
    pub from_name: String,
    pub subject: String,
    pub body: String,
    pub detected_at: DateTime<Local>,
}

impl AlertMessage {
    pub fn from_alert(alert: &Alert, template: &NotifyConfig) -> Self {
        let at: DateTime<Local> = alert.detected_at.into();
        Self {
            recipient_name: template.recipient_name.clone(),
            recipient_email: template.recipient_email.clone(),
            from_name: template.from_name.clone(),
            subject: template.subject.clone(),
            body: format!("Unknown face detected at {}", at.format("%Y-%m-%d %H:%M:%S")),
            detected_at: at,
        }
    }
}

pub type SendFuture = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'static>>;

pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, message: AlertMessage) -> SendFuture;
}

/// Writes alerts to the log and always succeeds.
pub struct LogTransport;

impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, message: AlertMessage) -> SendFuture {
        Box::pin(async move {
            tracing::warn!(
                to = %message.recipient_name,
                subject = %message.subject,
                body = %message.body,
                detected_at = %message.detected_at.to_rfc3339(),
                "ALERT"
            );
            Ok(())
        })
    }
}

/// Delivers alerts through the EmailJS REST API.
pub struct EmailJsTransport {
    client: reqwest::Client,
    endpoint: String,
    service_id: String,
    template_id: String,
    public_key: String,
}

impl EmailJsTransport {
    pub fn new(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: EMAILJS_ENDPOINT.to_string(),
            service_id: config.service_id.clone(),
            template_id: config.template_id.clone(),
            public_key: config.public_key.clone(),
        })
    }

    fn payload(&self, message: &AlertMessage) -> serde_json::Value {
        serde_json::json!({
            "service_id": self.service_id,
            "template_id": self.template_id,
            "user_id": self.public_key,
            "template_params": {
                "name": message.recipient_name,
                "to_name": message.recipient_name,
                "from_name": message.from_name,
                "subject": message.subject,
                "message": message.body,
                "email": message.recipient_email,
            },
        })
    }
}

impl Transport for EmailJsTransport {
    fn name(&self) -> &'static str {
        "emailjs"
    }

    fn send(&self, message: AlertMessage) -> SendFuture {
        let request = self.client.post(&self.endpoint).json(&self.payload(&message));
        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(NotifyError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(())
        })
    }
}

/// Build the transport named in the config.
pub fn transport_from_config(config: &NotifyConfig) -> Result<Arc<dyn Transport>, NotifyError> {
    Ok(match config.transport {
        TransportKind::Log => Arc::new(LogTransport),
        TransportKind::EmailJs => Arc::new(EmailJsTransport::new(config)?),
    })
}

/// Delivery outcomes, shared with the status service.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Fire-and-forget [`AlertSink`] backed by a [`Transport`].
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    template: NotifyConfig,
    runtime: Handle,
    stats: Arc<DeliveryStats>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, template: NotifyConfig, runtime: Handle) -> Self {
        Self {
            transport,
            template,
            runtime,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn delivery of one message. The returned handle may be dropped.
    pub fn send(&self, message: AlertMessage) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        self.runtime.spawn(async move {
            match transport.send(message).await {
                Ok(()) => {
                    stats.sent.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(transport = transport.name(), "alert delivered");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(transport = transport.name(), error = %e, "alert delivery failed");
                }
            }
        })
    }
}

impl AlertSink for Dispatcher {
    fn dispatch(&self, alert: Alert) {
        tracing::info!(distance = alert.distance, track = alert.track, "dispatching alert");
        let message = AlertMessage::from_alert(&alert, &self.template);
        drop(self.send(message));
    }
}
