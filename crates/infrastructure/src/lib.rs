pub mod connection;
pub mod consumer;
pub mod in_memory_queue;
pub mod publisher;
pub mod rabbitmq;
pub mod topology;

pub use connection::ConnectionManager;
pub use consumer::{decide, MessageDisposition, ResultConsumer};
pub use in_memory_queue::InMemoryMessageQueue;
pub use publisher::JobPublisher;
pub use rabbitmq::RabbitMessageQueue;
pub use topology::TopologyInitializer;
