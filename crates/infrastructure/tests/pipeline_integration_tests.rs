//! 管道集成测试
//!
//! 用内存队列驱动真实的发布器与消费者，配合虚拟时钟验证
//! 重试退避、死信与优雅排空的端到端行为，无需消息代理。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use analyzer_core::{
    codec, headers, AnalysisJobMessage, AnalysisResultMessage, AnalyzerError, AppConfig,
    JobStatus, MessageQueue, RequestStateStore, RequestStatus, RequestStatusService, Result,
    ResultHandler, RetryPolicy,
};
use analyzer_infrastructure::{InMemoryMessageQueue, JobPublisher, ResultConsumer};

/// 可编排失败次数的测试处理器
struct FlakyHandler {
    failures_before_success: u32,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
    permanent_failures: Mutex<Vec<String>>,
}

impl FlakyHandler {
    fn new(failures_before_success: u32) -> Self {
        Self {
            failures_before_success,
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
            permanent_failures: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultHandler for FlakyHandler {
    async fn handle_result(&self, _result: AnalysisResultMessage) -> Result<()> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().await.push(Instant::now());
        if call_index < self.failures_before_success {
            Err(AnalyzerError::Handler(format!(
                "第 {} 次处理注定失败",
                call_index + 1
            )))
        } else {
            Ok(())
        }
    }

    async fn on_permanent_failure(&self, request_id: &str) {
        self.permanent_failures
            .lock()
            .await
            .push(request_id.to_string());
    }
}

fn sample_result(request_id: &str, status: JobStatus) -> AnalysisResultMessage {
    AnalysisResultMessage {
        job_id: "J1".to_string(),
        request_id: request_id.to_string(),
        status,
        analysis_type: "security".to_string(),
        result: None,
        error_message: None,
    }
}

fn start_consumer(
    queue: Arc<InMemoryMessageQueue>,
    handler: Arc<dyn ResultHandler>,
) -> (broadcast::Sender<()>, JoinHandle<Result<()>>) {
    let config = AppConfig::default();
    let consumer = ResultConsumer::new(
        queue,
        handler,
        RetryPolicy::default(),
        &config.message_queue,
        &config.consumer,
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { consumer.run(shutdown_rx).await });
    (shutdown_tx, handle)
}

async fn publish_result(
    queue: &InMemoryMessageQueue,
    result: &AnalysisResultMessage,
) {
    let payload = codec::encode(result).unwrap();
    let metadata = analyzer_core::MessageMetadata::for_request(
        result.request_id.clone(),
        "test-correlation".to_string(),
    );
    queue
        .publish_message("analysis.results", &payload, &metadata)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_successful_result_is_acked_once() {
    let queue = Arc::new(InMemoryMessageQueue::new());
    let handler = Arc::new(FlakyHandler::new(0));
    let (shutdown_tx, handle) = start_consumer(queue.clone(), handler.clone());

    publish_result(&queue, &sample_result("R1", JobStatus::Completed)).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(handler.call_count(), 1);
    assert_eq!(queue.queue_depth("analysis.results").await.unwrap(), 0);
    assert_eq!(queue.queue_depth("analysis.jobs.dlq").await.unwrap(), 0);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success_never_dead_letters() {
    let queue = Arc::new(InMemoryMessageQueue::new());
    let handler = Arc::new(FlakyHandler::new(2));
    let (shutdown_tx, handle) = start_consumer(queue.clone(), handler.clone());

    publish_result(&queue, &sample_result("R1", JobStatus::Completed)).await;
    // 覆盖 5s + 30s 两个退避窗口
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(handler.call_count(), 3);
    assert_eq!(queue.queue_depth("analysis.results").await.unwrap(), 0);
    assert_eq!(queue.queue_depth("analysis.jobs.dlq").await.unwrap(), 0);
    assert!(handler.permanent_failures.lock().await.is_empty());

    // 两次重试间隔遵循 5s / 30s 的退避表
    let times = handler.call_times.lock().await;
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_secs(5) && first_gap < Duration::from_secs(7));
    assert!(second_gap >= Duration::from_secs(30) && second_gap < Duration::from_secs(32));

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_dead_letter_exactly_once() {
    let queue = Arc::new(InMemoryMessageQueue::new());
    let handler = Arc::new(FlakyHandler::new(u32::MAX));
    let (shutdown_tx, handle) = start_consumer(queue.clone(), handler.clone());

    publish_result(&queue, &sample_result("R1", JobStatus::Completed)).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    // 首次投递 + 两次重试后死信，之后不再投递
    assert_eq!(handler.call_count(), 3);
    assert_eq!(queue.queue_depth("analysis.jobs.dlq").await.unwrap(), 1);
    assert_eq!(queue.queue_depth("analysis.results").await.unwrap(), 0);
    assert_eq!(
        handler.permanent_failures.lock().await.as_slice(),
        ["R1".to_string()]
    );

    // 更多时间过去也不会重新投递
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(handler.call_count(), 3);
    assert_eq!(queue.queue_depth("analysis.jobs.dlq").await.unwrap(), 1);

    // 死信消息携带最终元数据
    let dead = queue
        .fetch_message("analysis.jobs.dlq")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(headers::read_retry_count(&dead.metadata), 2);
    assert_eq!(dead.metadata.request_id.as_deref(), Some("R1"));
    let original: AnalysisResultMessage = codec::decode(&dead.payload).unwrap().unwrap();
    assert_eq!(original.request_id, "R1");

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_scheduled_retry_without_loss() {
    let queue = Arc::new(InMemoryMessageQueue::new());
    let handler = Arc::new(FlakyHandler::new(u32::MAX));
    let (shutdown_tx, handle) = start_consumer(queue.clone(), handler.clone());

    publish_result(&queue, &sample_result("R1", JobStatus::Completed)).await;
    // 让首次投递失败并调度 5s 重发，但在重发落地前关闭
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handler.call_count(), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // 排空语义：已调度的重发在退出前落地，消息没有丢失
    assert_eq!(queue.queue_depth("analysis.results").await.unwrap(), 1);
    let redelivered = queue
        .fetch_message("analysis.results")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(headers::read_retry_count(&redelivered.metadata), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_job_publish_and_status_progression() {
    let queue = Arc::new(InMemoryMessageQueue::new());

    // 发布侧：任务进入任务队列并携带 requestId 元数据
    let publisher = JobPublisher::new(queue.clone(), "analysis.jobs");
    let job = AnalysisJobMessage {
        job_id: "J1".to_string(),
        request_id: "R1".to_string(),
        repository_url: "https://example.com/repo.git".to_string(),
        analysis_type: "security".to_string(),
        context_id: None,
    };
    publisher.publish_job(&job).await.unwrap();
    assert_eq!(queue.queue_depth("analysis.jobs").await.unwrap(), 1);

    let delivery = queue.fetch_message("analysis.jobs").await.unwrap().unwrap();
    assert_eq!(delivery.metadata.request_id.as_deref(), Some("R1"));
    let consumed_job: AnalysisJobMessage = codec::decode(&delivery.payload).unwrap().unwrap();
    assert_eq!(consumed_job, job);
    queue
        .ack_message("analysis.jobs", delivery.delivery_tag)
        .await
        .unwrap();

    // 消费侧：成功结果驱动请求状态推进
    let store = Arc::new(RequestStateStore::new());
    store.track("R1").await;
    let service = Arc::new(RequestStatusService::new(Arc::clone(&store)));
    let (shutdown_tx, handle) = start_consumer(queue.clone(), service);

    publish_result(&queue, &sample_result("R1", JobStatus::Completed)).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        store.get("R1").await.unwrap().status,
        RequestStatus::DiscoveryRunning
    );

    // 失败结果将请求置为 Failed
    publish_result(&queue, &sample_result("R1", JobStatus::Failed)).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        store.get("R1").await.unwrap().status,
        RequestStatus::Failed
    );

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unknown_request_result_is_dead_lettered_and_reported() {
    let queue = Arc::new(InMemoryMessageQueue::new());
    let store = Arc::new(RequestStateStore::new());
    let service = Arc::new(RequestStatusService::new(Arc::clone(&store)));
    let (shutdown_tx, handle) = start_consumer(queue.clone(), service);

    // 未登记的请求：处理器持续失败，重试耗尽后死信
    publish_result(&queue, &sample_result("ghost", JobStatus::Completed)).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(queue.queue_depth("analysis.jobs.dlq").await.unwrap(), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_payload_enters_retry_then_dead_letter_flow() {
    let queue = Arc::new(InMemoryMessageQueue::new());
    let handler = Arc::new(FlakyHandler::new(0));
    let (shutdown_tx, handle) = start_consumer(queue.clone(), handler.clone());

    queue
        .publish_message(
            "analysis.results",
            b"{definitely not json",
            &analyzer_core::MessageMetadata::for_request("R9", "C9"),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    // 解码失败从未到达处理器，也从未被静默丢弃
    assert_eq!(handler.call_count(), 0);
    assert_eq!(queue.queue_depth("analysis.jobs.dlq").await.unwrap(), 1);
    let dead = queue
        .fetch_message("analysis.jobs.dlq")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(headers::read_retry_count(&dead.metadata), 2);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
