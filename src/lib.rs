pub mod core;

pub use crate::core::{
    capability::{AsyncConsumer, AsyncProducer},
    config::{PostFinishPolicy, QueueConfig},
    error::{QueueError, QueueResult},
    handoff::{HandoffQueue, QueueStats},
};
