//! AMQP (RabbitMQ) inbound queue.
//!
//! Declares the durable extraction queue, caps unacknowledged deliveries with
//! `basic_qos`, and consumes in manual-ack mode. Deliveries are mapped to
//! [`InboundMessage`]s whose acker settles on the same channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use tracing::info;

use crate::coordinator::InboundMessage;
use crate::traits::MessageAcker;

const CONSUMER_TAG: &str = "topicgraph-analyzer";
const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// An open broker connection with an active consumer.
pub struct AmqpQueue {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue_name: String,
}

impl AmqpQueue {
    /// Connect, declare `queue_name` as durable, set prefetch, and start
    /// consuming with manual acknowledgement.
    pub async fn connect(broker_url: &str, queue_name: &str, prefetch: u16) -> Result<Self> {
        let connection = Connection::connect(broker_url, ConnectionProperties::default())
            .await
            .context("Failed to connect to broker")?;

        let channel = connection
            .create_channel()
            .await
            .context("Failed to create channel")?;

        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to declare queue {queue_name}"))?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .context("Failed to set prefetch count")?;

        let consumer = channel
            .basic_consume(
                queue_name,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to consume from {queue_name}"))?;

        info!(queue = queue_name, prefetch, "Consuming from broker");

        Ok(Self {
            connection,
            channel,
            consumer,
            queue_name: queue_name.to_string(),
        })
    }

    /// Stream of deliveries for the coordinator.
    pub fn deliveries(&self) -> impl Stream<Item = Result<InboundMessage>> + Send + 'static {
        self.consumer.clone().map(|delivery| {
            delivery
                .map(inbound_message)
                .context("Broker delivery failed")
        })
    }

    /// Close channel then connection. Unacknowledged deliveries go back to
    /// the queue.
    pub async fn close(self) -> Result<()> {
        info!(queue = self.queue_name.as_str(), "Closing broker connection");
        self.channel
            .close(200, "shutdown")
            .await
            .context("Failed to close channel")?;
        self.connection
            .close(200, "shutdown")
            .await
            .context("Failed to close connection")?;
        Ok(())
    }
}

fn inbound_message(delivery: Delivery) -> InboundMessage {
    InboundMessage {
        delivery_tag: delivery.delivery_tag,
        delivery_count: delivery_count(&delivery.properties),
        redelivered: delivery.redelivered,
        body: delivery.data,
        acker: Box::new(delivery.acker),
    }
}

/// Prior delivery attempts from the `x-delivery-count` header.
fn delivery_count(properties: &BasicProperties) -> Option<u32> {
    let headers = properties.headers().as_ref()?;
    let (_, value) = headers
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == DELIVERY_COUNT_HEADER)?;
    header_u32(value)
}

fn header_u32(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortUInt(n) => Some(u32::from(*n)),
        AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
        AMQPValue::LongUInt(n) => Some(*n),
        AMQPValue::ShortShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
        _ => None,
    }
}

#[async_trait]
impl MessageAcker for Acker {
    async fn ack(&self) -> Result<()> {
        Acker::ack(self, BasicAckOptions::default())
            .await
            .context("basic.ack failed")
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        Acker::reject(self, BasicRejectOptions { requeue })
            .await
            .context("basic.reject failed")
    }
}
