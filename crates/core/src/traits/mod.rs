pub mod message_queue;
pub mod result_handler;

pub use message_queue::{Delivery, MessageQueue, MockMessageQueue};
pub use result_handler::{MockResultHandler, ResultHandler};
