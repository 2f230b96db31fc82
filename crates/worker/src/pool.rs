//! 有界工作池
//!
//! 任务消息经 mpsc 队列进入工作池，每条消息在独立的 tokio 任务中执行，
//! 同时执行的数量由信号量限制。关闭时停止接收新消息并等待正在执行的任务结束。
//! 没有被执行的消息（无处理器、关闭时仍在队列中）对应的任务会被标记为失败。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use adaptor_core::{
    models::{TaskKind, TaskStatus},
    traits::TaskRepository,
    AdaptorError, AdaptorResult, Cancellation,
};
use async_trait::async_trait;
use metrics::{counter, gauge, histogram};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::message::TaskMessage;

const DEFAULT_QUEUE_SIZE: usize = 128;

/// 任务处理器，错误由处理器自行转换为任务事件
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn handle(&self, message: TaskMessage, cancel: Cancellation);
}

/// 向工作池投递任务消息
#[derive(Clone)]
pub struct TaskPublisher {
    sender: mpsc::Sender<TaskMessage>,
}

impl TaskPublisher {
    pub async fn publish(&self, message: TaskMessage) -> AdaptorResult<()> {
        let task_id = message.task_id().to_string();
        self.sender
            .send(message)
            .await
            .map_err(|_| AdaptorError::Internal(format!("任务队列已关闭, 任务 {task_id} 未投递")))?;
        debug!(task_id = %task_id, "任务消息已投递");
        Ok(())
    }
}

type RunningTasks = Arc<RwLock<HashMap<String, Cancellation>>>;

pub struct WorkerPool {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    tasks: Option<Arc<dyn TaskRepository>>,
    concurrency: usize,
    queue_size: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            tasks: None,
            concurrency: concurrency.max(1),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    /// 用于标记未执行任务的仓储
    pub fn with_task_repository(mut self, tasks: Arc<dyn TaskRepository>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn register(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    /// 启动消费循环，返回投递句柄与控制句柄
    pub fn start(self) -> (TaskPublisher, WorkerPoolHandle) {
        let (sender, receiver) = mpsc::channel(self.queue_size);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let running: RunningTasks = Arc::new(RwLock::new(HashMap::new()));
        let stop = Cancellation::new();

        info!(
            concurrency = self.concurrency,
            handlers = self.handlers.len(),
            "启动任务工作池"
        );
        let join = tokio::spawn(consume(
            receiver,
            Arc::new(self.handlers),
            self.tasks,
            semaphore.clone(),
            running.clone(),
            stop.clone(),
        ));

        (
            TaskPublisher { sender },
            WorkerPoolHandle {
                stop,
                semaphore,
                running,
                concurrency: self.concurrency,
                join,
            },
        )
    }
}

async fn consume(
    mut receiver: mpsc::Receiver<TaskMessage>,
    handlers: Arc<HashMap<TaskKind, Arc<dyn TaskHandler>>>,
    tasks: Option<Arc<dyn TaskRepository>>,
    semaphore: Arc<Semaphore>,
    running: RunningTasks,
    stop: Cancellation,
) {
    loop {
        let message = tokio::select! {
            message = receiver.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = stop.cancelled() => break,
        };

        let kind = message.kind();
        let Some(handler) = handlers.get(&kind).cloned() else {
            warn!(task_id = %message.task_id(), "没有 {} 类型的任务处理器，丢弃消息", kind);
            reject(tasks.as_deref(), &message).await;
            continue;
        };

        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    reject(tasks.as_deref(), &message).await;
                    break;
                }
            },
            _ = stop.cancelled() => {
                warn!(task_id = %message.task_id(), "工作池关闭，任务未执行");
                reject(tasks.as_deref(), &message).await;
                break;
            }
        };

        let task_id = message.task_id().to_string();
        let cancel = Cancellation::new();
        running.write().await.insert(task_id.clone(), cancel.clone());
        gauge!("worker_running_tasks").increment(1.0);

        let running = running.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            info!(task_id = %task_id, kind = %kind, "开始执行任务");
            handler.handle(message, cancel).await;

            running.write().await.remove(&task_id);
            gauge!("worker_running_tasks").decrement(1.0);
            histogram!("worker_task_duration_seconds", "kind" => kind.to_string())
                .record(started.elapsed().as_secs_f64());
            info!(task_id = %task_id, "任务执行结束, 耗时 {:?}", started.elapsed());
            drop(permit);
        });
    }

    // 关闭后队列中剩余的消息不再执行
    receiver.close();
    while let Some(message) = receiver.recv().await {
        warn!(task_id = %message.task_id(), "工作池关闭，任务未执行");
        reject(tasks.as_deref(), &message).await;
    }
    debug!("任务消费循环已退出");
}

/// 未执行的消息对应的任务标记为失败，避免其一直阻塞同一集群的后续任务
async fn reject(tasks: Option<&dyn TaskRepository>, message: &TaskMessage) {
    let kind = message.kind();
    counter!("worker_tasks_dropped_total", "kind" => kind.to_string()).increment(1);
    let Some(tasks) = tasks else {
        return;
    };
    if let Err(e) = tasks
        .update_status(message.eid(), kind, message.task_id(), TaskStatus::Failure)
        .await
    {
        error!(task_id = %message.task_id(), "标记未执行任务失败: {}", e);
    }
}

/// 工作池控制句柄
pub struct WorkerPoolHandle {
    stop: Cancellation,
    semaphore: Arc<Semaphore>,
    running: RunningTasks,
    concurrency: usize,
    join: JoinHandle<()>,
}

impl WorkerPoolHandle {
    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    /// 取消正在执行的任务，引擎在下一次阻塞调用时退出
    pub async fn cancel_task(&self, task_id: &str) -> AdaptorResult<()> {
        match self.running.read().await.get(task_id) {
            Some(cancel) => {
                cancel.cancel();
                info!(task_id = %task_id, "已发送任务取消信号");
                Ok(())
            }
            None => {
                warn!("任务取消失败：任务 {} 不在运行中", task_id);
                Err(AdaptorError::TaskNotFound(task_id.to_string()))
            }
        }
    }

    /// 停止接收新消息，等待正在执行的任务结束
    ///
    /// 超过 `grace` 仍未结束的任务会收到取消信号。
    pub async fn shutdown(self, grace: Duration) {
        info!("停止任务工作池");
        self.stop.cancel();
        if let Err(e) = self.join.await {
            error!("任务消费循环异常退出: {}", e);
        }

        let permits = self.concurrency as u32;
        let drained = tokio::time::timeout(grace, self.semaphore.acquire_many(permits)).await;
        if drained.is_err() {
            let running = self.running.read().await;
            warn!("等待任务结束超时，取消 {} 个正在执行的任务", running.len());
            for cancel in running.values() {
                cancel.cancel();
            }
            drop(running);
            let _ = self.semaphore.acquire_many(permits).await;
        }
        info!("任务工作池已停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InitRainbondMessage;
    use adaptor_core::models::Task;
    use adaptor_infrastructure::DatabaseManager;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowHandler {
        active: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
        delay: Duration,
    }

    impl SlowHandler {
        fn new(delay: Duration) -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                done: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl TaskHandler for SlowHandler {
        fn kind(&self) -> TaskKind {
            TaskKind::InitRainbond
        }

        async fn handle(&self, _message: TaskMessage, cancel: Cancellation) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _ = cancel
                .run(async {
                    tokio::time::sleep(self.delay).await;
                    Ok(())
                })
                .await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn message(task_id: &str) -> TaskMessage {
        TaskMessage::InitRainbond(InitRainbondMessage {
            eid: "e1".to_string(),
            task_id: task_id.to_string(),
            provider: "rke".to_string(),
            cluster_id: "c1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_and_shutdown_drains() {
        let handler = Arc::new(SlowHandler::new(Duration::from_millis(50)));
        let (publisher, handle) = WorkerPool::new(2).register(handler.clone()).start();

        for i in 0..5 {
            publisher.publish(message(&format!("t{i}"))).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.shutdown(Duration::from_secs(5)).await;

        assert_eq!(handler.done.load(Ordering::SeqCst), 5);
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_after_grace() {
        let handler = Arc::new(SlowHandler::new(Duration::from_secs(60)));
        let (publisher, handle) = WorkerPool::new(1).register(handler.clone()).start();

        publisher.publish(message("t1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.running_count().await, 1);

        handle.shutdown(Duration::from_millis(20)).await;
        assert_eq!(handler.done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let handler = Arc::new(SlowHandler::new(Duration::from_secs(60)));
        let (publisher, handle) = WorkerPool::new(1).register(handler.clone()).start();

        publisher.publish(message("t1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel_task("t1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handler.done.load(Ordering::SeqCst), 1);

        let err = handle.cancel_task("t1").await.unwrap_err();
        assert!(matches!(err, AdaptorError::TaskNotFound(_)));
        handle.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_fails() {
        let (publisher, handle) = WorkerPool::new(1).start();
        handle.shutdown(Duration::from_millis(10)).await;
        assert!(publisher.publish(message("t1")).await.is_err());
    }

    async fn stored_tasks(ids: &[&str]) -> (DatabaseManager, Arc<dyn TaskRepository>) {
        let db = DatabaseManager::in_memory().await.unwrap();
        let tasks = db.task_repository();
        for id in ids {
            let mut task = Task::new(TaskKind::InitRainbond, "e1", "rke", "c1");
            task.task_id = id.to_string();
            tasks.create_task(&task).await.unwrap();
        }
        (db, tasks)
    }

    async fn status(tasks: &Arc<dyn TaskRepository>, id: &str) -> TaskStatus {
        tasks
            .get_task("e1", TaskKind::InitRainbond, id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_message_without_handler_fails_task() {
        let (_db, tasks) = stored_tasks(&["t1"]).await;
        let (publisher, handle) = WorkerPool::new(1)
            .with_task_repository(tasks.clone())
            .start();

        publisher.publish(message("t1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(status(&tasks, "t1").await, TaskStatus::Failure);
        handle.shutdown(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_tasks() {
        let (_db, tasks) = stored_tasks(&["t1", "t2", "t3"]).await;
        let handler = Arc::new(SlowHandler::new(Duration::from_secs(60)));
        let (publisher, handle) = WorkerPool::new(1)
            .with_task_repository(tasks.clone())
            .register(handler.clone())
            .start();

        for id in ["t1", "t2", "t3"] {
            publisher.publish(message(id)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown(Duration::from_millis(20)).await;

        // t1 已交给处理器，状态由处理器负责
        assert_eq!(handler.done.load(Ordering::SeqCst), 1);
        assert_eq!(status(&tasks, "t1").await, TaskStatus::Pending);
        assert_eq!(status(&tasks, "t2").await, TaskStatus::Failure);
        assert_eq!(status(&tasks, "t3").await, TaskStatus::Failure);
    }
}
