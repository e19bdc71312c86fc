use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info};

use analyzer_core::{
    AppConfig, HealthStatus, RequestStateStore, RequestStatusService, RetryPolicy,
};
use analyzer_infrastructure::{
    ConnectionManager, JobPublisher, RabbitMessageQueue, ResultConsumer, TopologyInitializer,
};

/// 主应用程序
///
/// 装配连接管理器、拓扑初始化器、发布器与结果消费者。HTTP层等外部
/// 协作方通过 `publisher()` 与 `health()` 消费管道的公共接口。
pub struct Application {
    config: AppConfig,
    manager: Arc<ConnectionManager>,
    publisher: Arc<JobPublisher>,
    consumer: Arc<ResultConsumer>,
    store: Arc<RequestStateStore>,
}

impl Application {
    /// 创建应用实例并完成拓扑初始化
    ///
    /// 拓扑初始化失败是致命错误：进程在此终止，不接受任何工作。
    pub async fn new(config: AppConfig) -> Result<Self> {
        let manager = Arc::new(ConnectionManager::new(config.message_queue.url.clone()));

        TopologyInitializer::new(Arc::clone(&manager), config.message_queue.clone())
            .initialize()
            .await
            .context("队列拓扑初始化失败，进程不接受工作")?;

        let queue = Arc::new(RabbitMessageQueue::new(Arc::clone(&manager)));
        let publisher = Arc::new(JobPublisher::new(
            queue.clone(),
            config.message_queue.job_queue.clone(),
        ));

        let store = Arc::new(RequestStateStore::new());
        let handler = Arc::new(RequestStatusService::new(Arc::clone(&store)));
        let consumer = Arc::new(ResultConsumer::new(
            queue,
            handler,
            RetryPolicy::default(),
            &config.message_queue,
            &config.consumer,
        ));

        Ok(Self {
            config,
            manager,
            publisher,
            consumer,
            store,
        })
    }

    /// 任务发布入口，供API层在持久化请求后调用
    pub fn publisher(&self) -> Arc<JobPublisher> {
        Arc::clone(&self.publisher)
    }

    /// 请求状态跟踪器
    pub fn store(&self) -> Arc<RequestStateStore> {
        Arc::clone(&self.store)
    }

    /// 存活/就绪探针消费的健康状态
    pub async fn health(&self) -> HealthStatus {
        self.manager.health().await
    }

    /// 运行消费循环直至收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            result_queue = %self.config.message_queue.result_queue,
            "应用程序启动"
        );

        self.consumer
            .run(shutdown_rx)
            .await
            .context("结果消费循环异常退出")?;

        if let Err(e) = self.manager.close().await {
            error!("关闭代理连接失败: {e}");
        }
        Ok(())
    }
}
