pub mod codec;
pub mod config;
pub mod errors;
pub mod headers;
pub mod models;
pub mod retry;
pub mod services;
pub mod traits;

pub use config::{AppConfig, ConsumerConfig, MessageQueueConfig};
pub use errors::{AnalyzerError, Result};
pub use headers::{HeaderValue, MessageMetadata, REQUEST_ID_HEADER, RETRY_COUNT_HEADER};
pub use models::{
    AnalysisJobMessage, AnalysisResultMessage, HealthStatus, JobStatus, RequestState,
    RequestStateStore, RequestStatus,
};
pub use retry::RetryPolicy;
pub use services::RequestStatusService;
pub use traits::{Delivery, MessageQueue, MockMessageQueue, MockResultHandler, ResultHandler};
