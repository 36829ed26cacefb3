//! Subscription registry and fan-out dispatch

mod registry;
mod sink;

pub use registry::{DispatchReport, KindRegistry, SinkId, SubscriptionRegistry};
pub use sink::{DeliveryError, EventSink};

use crate::ack::AckHandle;
use crate::error::Result;

/// A registration together with the acknowledgments of the subscribe
/// commands it issued
#[derive(Debug)]
pub struct Subscription {
    pub id: SinkId,
    pub acks: Vec<AckHandle>,
}

impl Subscription {
    /// Wait until the venue acknowledged every topic
    pub async fn acknowledged(self) -> Result<SinkId> {
        for ack in self.acks {
            ack.acknowledged().await?;
        }
        Ok(self.id)
    }
}
