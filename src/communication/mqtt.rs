//! MQTT transport.
//!
//! Every value is published retained with QoS 1 so a new subscriber sees the
//! current state at once. Topics:
//!
//! | topic                     | direction | payload          |
//! |---------------------------|-----------|------------------|
//! | `/sys/shutdown`           | in        | shutdown notice  |
//! | `/fan/<output>/pwm-set`   | in        | duty, 0..=100    |
//! | `/fan/<output>/pwm`       | out       | current duty     |
//! | `/fan/<output>/pwm-min`   | out       | minimum duty     |
//! | `/fan/<sensor>/rpm`       | out       | speed            |
//!
//! Sensor names map to topic levels by replacing `-` with `/`, so "front-1"
//! publishes on `/fan/front/1/rpm`.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

use super::{Command, PortError, Telemetry, TelemetryPort};
use crate::config::MqttConfig;
use crate::fan_control::BoardTopology;

pub const SHUTDOWN_TOPIC: &str = "/sys/shutdown";

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

fn channel_path(name: &str) -> String {
    name.replace('-', "/")
}

fn duty_set_topic(output: &str) -> String {
    format!("/fan/{}/pwm-set", channel_path(output))
}

/// Topic and payload for an outbound value.
pub fn encode(telemetry: &Telemetry) -> (String, String) {
    match telemetry {
        Telemetry::Duty { output, percent } => {
            (format!("/fan/{}/pwm", channel_path(output)), percent.to_string())
        }
        Telemetry::MinDuty { output, percent } => {
            (format!("/fan/{}/pwm-min", channel_path(output)), percent.to_string())
        }
        Telemetry::Rpm { sensor, rpm } => {
            (format!("/fan/{}/rpm", channel_path(sensor)), rpm.to_string())
        }
    }
}

/// Topics to subscribe to for `topology`.
pub fn subscriptions(topology: BoardTopology) -> Vec<String> {
    std::iter::once(SHUTDOWN_TOPIC.to_string())
        .chain(topology.outputs().iter().map(|o| duty_set_topic(o.name)))
        .collect()
}

/// Map an inbound message to a command. `None` for topics this board does
/// not listen to.
pub fn route(topology: BoardTopology, topic: &str, payload: &[u8]) -> Option<Command> {
    if topic == SHUTDOWN_TOPIC {
        return Some(Command::Shutdown {
            payload: payload.to_vec(),
        });
    }
    topology
        .outputs()
        .iter()
        .find(|o| duty_set_topic(o.name) == topic)
        .map(|o| Command::SetDuty {
            output: o.name,
            payload: payload.to_vec(),
        })
}

/// Publishing half. Publishes are queued without waiting; a full queue is
/// reported as an error.
#[derive(Clone)]
pub struct MqttPort {
    client: AsyncClient,
}

impl TelemetryPort for MqttPort {
    fn publish(&mut self, telemetry: Telemetry) -> Result<(), PortError> {
        let (topic, payload) = encode(&telemetry);
        tracing::debug!("{} <- {}", topic, payload);
        self.client
            .try_publish(topic.clone(), QoS::AtLeastOnce, true, payload)
            .map_err(|e| PortError::Rejected {
                topic,
                reason: e.to_string(),
            })
    }
}

/// Connection half: drives the event loop and forwards commands.
pub struct MqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
    topology: BoardTopology,
}

/// Create the client. Nothing touches the network until
/// [`MqttLink::run`] is polled, but publishes may be queued right away.
pub fn connect(config: &MqttConfig, topology: BoardTopology) -> (MqttPort, MqttLink) {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    let (client, eventloop) = AsyncClient::new(options, config.queue_capacity);
    tracing::info!("MQTT broker {}:{}", config.host, config.port);
    (
        MqttPort {
            client: client.clone(),
        },
        MqttLink {
            client,
            eventloop,
            topology,
        },
    )
}

/// Subscriptions not yet accepted by the client on the current connection.
///
/// A full request queue refuses `try_subscribe`; refused topics stay here and
/// are retried after every event until the client takes them.
#[derive(Debug, Default)]
struct PendingSubscriptions {
    topics: Vec<String>,
}

impl PendingSubscriptions {
    /// A new connection starts with no subscriptions.
    fn reset(&mut self, topology: BoardTopology) {
        self.topics = subscriptions(topology);
    }

    fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Offer each pending topic to `subscribe`, keeping the refused ones.
    fn retry<E: std::fmt::Display>(&mut self, mut subscribe: impl FnMut(&str) -> Result<(), E>) {
        self.topics.retain(|topic| match subscribe(topic) {
            Ok(()) => {
                tracing::debug!("subscribed to {}", topic);
                false
            }
            Err(e) => {
                tracing::debug!("subscribe to {} deferred: {}", topic, e);
                true
            }
        });
    }
}

impl MqttLink {
    /// Poll the connection forever, reconnecting after errors. Returns once
    /// the command receiver is gone.
    pub async fn run(mut self, commands: mpsc::Sender<Command>) {
        let mut pending = PendingSubscriptions::default();
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("MQTT connected");
                    pending.reset(self.topology);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match route(self.topology, &publish.topic, &publish.payload) {
                        Some(command) => {
                            if commands.send(command).await.is_err() {
                                tracing::debug!("command receiver gone, leaving MQTT loop");
                                return;
                            }
                        }
                        None => tracing::warn!("unrecognized topic {:?}", publish.topic),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("MQTT connection: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }

            if !pending.is_empty() {
                let client = &self.client;
                pending.retry(|topic| client.try_subscribe(topic, QoS::AtLeastOnce));
                if !pending.is_empty() {
                    tracing::warn!("request queue full, {} subscriptions pending", pending.topics.len());
                }
            }
        }
    }
}
