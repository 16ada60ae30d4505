//! MQTT alert sink. Alerts are published to `<prefix>/<kind>` as JSON; the
//! rumqttc event loop runs on its own task and reconnects on error.

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::alerts::{AlertEvent, AlertKind, DispatchError, Notifier, Severity};
use crate::config::MqttConfig;

// ---------------------------------------------------------------------------
// Topic / payload helpers
// ---------------------------------------------------------------------------

/// "<prefix>/<kind>", tolerating a trailing slash on the prefix.
pub(crate) fn alert_topic(prefix: &str, kind: AlertKind) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), kind.as_str())
}

pub(crate) fn alert_payload(event: &AlertEvent) -> Result<Vec<u8>, serde_json::Error> {
    let mut body = serde_json::to_value(event)?;
    if let Some(obj) = body.as_object_mut() {
        obj.insert("message".into(), event.message().into());
    }
    serde_json::to_vec(&body)
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct MqttNotifier {
    client: AsyncClient,
    prefix: String,
    min_severity: Severity,
}

impl MqttNotifier {
    pub fn new(client: AsyncClient, prefix: &str, min_severity: Severity) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
            min_severity,
        }
    }

    /// Build the client and spawn the event loop poller. Must be called from
    /// inside a tokio runtime.
    pub fn connect(cfg: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, eventloop) = AsyncClient::new(options, 20);
        tokio::spawn(poll_forever(eventloop));
        info!(host = %cfg.host, port = cfg.port, prefix = %cfg.topic_prefix, "mqtt alerts enabled");

        Self::new(client, &cfg.topic_prefix, cfg.min_severity)
    }
}

impl Notifier for MqttNotifier {
    fn name(&self) -> &str {
        "mqtt"
    }

    /// Queues the publish without waiting for the broker. A full request
    /// queue (broker unreachable for a while) is a delivery failure.
    fn notify(&mut self, event: &AlertEvent) -> Result<(), DispatchError> {
        if event.severity < self.min_severity {
            return Ok(());
        }
        let topic = alert_topic(&self.prefix, event.kind);
        let payload = alert_payload(event)?;
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| DispatchError::Sink {
                sink: "mqtt".into(),
                detail: e.to_string(),
            })
    }
}

async fn poll_forever(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("mqtt connected"),
            Ok(Event::Incoming(Packet::Disconnect)) => warn!("mqtt disconnected"),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "mqtt error, reconnecting");
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(severity: Severity) -> AlertEvent {
        AlertEvent::new(
            AlertKind::TemperatureHigh,
            severity,
            1_700_000_000,
            json!({"value": 36.5, "limit": 35.0}),
        )
    }

    /// Client whose event loop is never polled; publishes only fill the
    /// request queue (capacity `cap`).
    fn offline_client(cap: usize) -> (AsyncClient, EventLoop) {
        AsyncClient::new(MqttOptions::new("test", "localhost", 1883), cap)
    }

    // -- alert_topic --------------------------------------------------------

    #[test]
    fn topic_joins_prefix_and_kind() {
        assert_eq!(
            alert_topic("bloom/alerts", AlertKind::RainStarted),
            "bloom/alerts/rain_started"
        );
    }

    #[test]
    fn topic_trims_trailing_slash() {
        assert_eq!(
            alert_topic("farm/", AlertKind::SensorFault),
            "farm/sensor_fault"
        );
    }

    // -- alert_payload ------------------------------------------------------

    #[test]
    fn payload_is_json_with_message() {
        let bytes = alert_payload(&event(Severity::Warning)).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["kind"], "temperature_high");
        assert_eq!(v["severity"], "warning");
        assert_eq!(v["ts"], 1_700_000_000);
        assert_eq!(v["payload"]["value"], 36.5);
        assert_eq!(v["message"], "temperature 36.5°C above 35.0°C");
    }

    // -- MqttNotifier -------------------------------------------------------

    #[test]
    fn publish_is_queued() {
        let (client, _eventloop) = offline_client(10);
        let mut n = MqttNotifier::new(client, "bloom/alerts", Severity::Info);
        n.notify(&event(Severity::Warning)).unwrap();
    }

    #[test]
    fn below_min_severity_is_skipped() {
        // Capacity 1: a skipped event must not consume the only slot.
        let (client, _eventloop) = offline_client(1);
        let mut n = MqttNotifier::new(client, "bloom/alerts", Severity::Critical);
        n.notify(&event(Severity::Warning)).unwrap();
        n.notify(&event(Severity::Critical)).unwrap();
    }

    #[test]
    fn full_queue_is_a_sink_error() {
        let (client, _eventloop) = offline_client(1);
        let mut n = MqttNotifier::new(client, "bloom/alerts", Severity::Info);
        n.notify(&event(Severity::Warning)).unwrap();
        let err = n.notify(&event(Severity::Warning)).unwrap_err();
        assert!(matches!(err, DispatchError::Sink { ref sink, .. } if sink == "mqtt"));
    }
}
