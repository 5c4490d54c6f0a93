// crates/flowcore/src/events/mod.rs

mod broadcast;
mod channel;
mod iggy_bus;

pub use broadcast::{ChannelBroadcaster, EventBus, FanoutBroadcaster, StatusBroadcaster};
pub use channel::{publish_json, Delivery, MemoryChannel, MessageChannel, Subscription, Topic};
pub use iggy_bus::{IggyChannel, IggyChannelConfig, IggySubscription};
