use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// More completed trips than this between one passenger/driver pair in a day
/// is treated as collusion farming.
pub const REPEATED_PAIR_MAX_PER_DAY: i64 = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FraudSignal {
    pub user_id: Uuid,
    pub trip_id: Option<Uuid>,
    pub kind: String,
    pub severity: i16,
    pub payload: serde_json::Value,
}

pub mod kinds {
    pub const REPEATED_PAIR: &str = "repeated_pair";
    pub const OTP_ABUSE: &str = "otp_abuse";
    pub const RAPID_CANCELLATION: &str = "rapid_cancellation";
}

/// Outbound boundary to the fraud service. Reporting is fire-and-forget:
/// implementations log delivery failures instead of surfacing them, a fraud
/// outage must never block dispatch.
#[async_trait]
pub trait FraudSink: Send + Sync {
    async fn report(&self, signal: FraudSignal);
}

pub struct HttpFraudSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFraudSink {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl FraudSink for HttpFraudSink {
    #[tracing::instrument(skip(self))]
    async fn report(&self, signal: FraudSignal) {
        let url = format!("{}/signals", self.base_url);

        match self.client.post(&url).json(&signal).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(status = %response.status(), kind = %signal.kind, "fraud signal rejected");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%err, kind = %signal.kind, "failed to deliver fraud signal");
            }
        }
    }
}

/// Swallows signals; used in tests.
pub struct NullFraudSink;

#[async_trait]
impl FraudSink for NullFraudSink {
    async fn report(&self, _signal: FraudSignal) {}
}

pub fn is_repeated_pair(completed_today: i64) -> bool {
    completed_today > REPEATED_PAIR_MAX_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_threshold_is_exclusive() {
        assert!(!is_repeated_pair(REPEATED_PAIR_MAX_PER_DAY));
        assert!(is_repeated_pair(REPEATED_PAIR_MAX_PER_DAY + 1));
    }
}
