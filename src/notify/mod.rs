//! Outbound notifications
//!
//! The pipelines hand fully-formed payloads to a `Notifier`; delivery is
//! fire-and-forget from their point of view. Formatting here is plain
//! text; consumers render to whatever channel they own.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::config::NotifyConfig;
use crate::domain::{ChannelId, PlayerId, RetaliationAlert};
use crate::error::{Result, WardenError};

/// One delayer line in a "mission delayed" notification.
#[derive(Debug, Clone, Serialize)]
pub struct DelayerLine {
    pub player_id: PlayerId,
    /// None when the participant cannot be resolved to a known player;
    /// rendered with a disabled-state indicator
    pub name: Option<String>,
    pub status: String,
}

/// Everything the pipelines can emit.
#[derive(Debug, Clone, Serialize)]
pub enum Notification {
    Retaliation(RetaliationAlert),
    MissionDelayed {
        faction_name: String,
        kind: String,
        mission_id: u64,
        ready_count: usize,
        total: usize,
        delayers: Vec<DelayerLine>,
    },
    MissionReady {
        faction_name: String,
        kind: String,
        mission_id: u64,
    },
    MissionCompleted {
        faction_name: String,
        kind: String,
        mission_id: u64,
        initiator: Option<String>,
        succeeded: bool,
        money_gain: i64,
        respect_gain: f64,
    },
    /// Personal nudge to a participant holding a mission up
    DelayerNudge {
        kind: String,
        mission_id: u64,
    },
}

impl Notification {
    /// Plain-text rendering used by the webhook notifier.
    pub fn render(&self) -> String {
        match self {
            Notification::Retaliation(alert) => {
                let mut text = format!(
                    "Retaliation window open on {} [{}]",
                    alert.aggressor_name, alert.aggressor_id
                );
                if let (Some(faction), Some(name)) =
                    (alert.aggressor_faction, &alert.aggressor_faction_name)
                {
                    text.push_str(&format!(" from {name} [{faction}]"));
                }
                text.push_str(&format!(
                    "\n{} {} {} [{}] (-{:.2} respect)",
                    alert.aggressor_name,
                    alert.result.to_lowercase(),
                    alert.victim_name,
                    alert.victim_id,
                    alert.respect_gain,
                ));
                text.push_str(&format!("\nWindow closes at {}", alert.expires_at));
                if let Some(est) = &alert.estimated_aggressor_strength {
                    text.push_str(&format!(
                        "\nEstimated strength: {:.0} (observed {})",
                        est.score, est.observed_at
                    ));
                }
                if alert.aggressor_chaining {
                    text.push_str("\nAggressor faction is chaining");
                }
                text
            }
            Notification::MissionDelayed {
                faction_name,
                kind,
                mission_id,
                ready_count,
                total,
                delayers,
            } => {
                let mut text = format!(
                    "Mission of {faction_name} delayed: {kind} ({ready_count}/{total}) #{mission_id}"
                );
                for d in delayers {
                    match &d.name {
                        Some(name) => {
                            text.push_str(&format!("\n- {} [{}]: {}", name, d.player_id, d.status))
                        }
                        None => text.push_str(&format!(
                            "\n- Unknown [{}] (unresolved): {}",
                            d.player_id, d.status
                        )),
                    }
                }
                text
            }
            Notification::MissionReady {
                faction_name,
                kind,
                mission_id,
            } => format!("Mission of {faction_name} ready: {kind} #{mission_id}"),
            Notification::MissionCompleted {
                faction_name,
                kind,
                mission_id,
                initiator,
                succeeded,
                money_gain,
                respect_gain,
            } => {
                let initiator = initiator.as_deref().unwrap_or("Someone");
                if *succeeded {
                    format!(
                        "Mission of {faction_name} completed: {kind} #{mission_id} \
                         initiated successfully by {initiator}, gaining ${money_gain} \
                         and {respect_gain:.2} respect"
                    )
                } else {
                    format!(
                        "Mission of {faction_name} completed: {kind} #{mission_id} \
                         initiated unsuccessfully by {initiator}"
                    )
                }
            }
            Notification::DelayerNudge { kind, mission_id } => format!(
                "You are currently delaying the {kind} (#{mission_id}) you are \
                 participating in. Please become available so it can be initiated."
            ),
        }
    }
}

/// Notification delivery collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post to a configured channel.
    async fn send(&self, channel: ChannelId, note: &Notification) -> Result<()>;

    /// Direct message to a single player, when they are reachable.
    async fn direct_message(&self, player: PlayerId, note: &Notification) -> Result<()>;
}

/// Webhook-backed notifier posting rendered text to the chat API.
pub struct WebhookNotifier {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

impl WebhookNotifier {
    pub fn new(config: &NotifyConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.webhook_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: String, text: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(&WebhookMessage { content: text })
            .send()
            .await?;

        if resp.status().is_success() {
            debug!(%url, "notification delivered");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(WardenError::Delivery(format!("HTTP {status}: {body}")))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, channel: ChannelId, note: &Notification) -> Result<()> {
        self.post(format!("channels/{channel}/messages"), &note.render())
            .await
    }

    async fn direct_message(&self, player: PlayerId, note: &Notification) -> Result<()> {
        self.post(format!("users/{player}/messages"), &note.render())
            .await
    }
}
