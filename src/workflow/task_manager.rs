//! Async sub-agent task manager: tracks long-running `Agent::execute`
//! runs as named tasks, backed by a supervised actor so submissions,
//! queries and control operations are serialized through one mailbox
//! while the actual agent work happens in independently spawned tasks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::actor::{request, ActorRef, ActorSystem, Context, Props};
use crate::agent::{Agent, AgentEvent, AgentInput, ExecContext};
use crate::error::{CoreError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct TaskSnapshot {
    pub id: u64,
    pub status: TaskStatus,
    pub event_count: usize,
    pub error: Option<String>,
    pub resumed_from: Option<u64>,
}

struct TaskRecord {
    status: TaskStatus,
    cancel: CancellationToken,
    agent: Arc<dyn Agent>,
    input: AgentInput,
    events: Vec<AgentEvent>,
    error: Option<String>,
    resumed_from: Option<u64>,
}

impl TaskRecord {
    fn snapshot(&self, id: u64) -> TaskSnapshot {
        TaskSnapshot {
            id,
            status: self.status,
            event_count: self.events.len(),
            error: self.error.clone(),
            resumed_from: self.resumed_from,
        }
    }
}

enum TaskMsg {
    Submit {
        agent: Arc<dyn Agent>,
        input: AgentInput,
        resumed_from: Option<u64>,
        reply: oneshot::Sender<u64>,
    },
    Query {
        id: u64,
        reply: oneshot::Sender<Option<TaskSnapshot>>,
    },
    List {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },
    Stop {
        id: u64,
    },
    Resume {
        id: u64,
        reply: oneshot::Sender<Result<u64>>,
    },
    Wait {
        id: u64,
        reply: oneshot::Sender<Result<TaskStatus>>,
    },
    /// Reported by a background worker task back to the manager so
    /// status updates happen on the manager's own mailbox.
    Progress {
        id: u64,
        event: AgentEvent,
    },
    Finished {
        id: u64,
        outcome: std::result::Result<(), CoreError>,
    },
}

struct TaskManagerState {
    next_id: u64,
    tasks: HashMap<u64, TaskRecord>,
    waiters: HashMap<u64, Vec<oneshot::Sender<Result<TaskStatus>>>>,
}

impl TaskManagerState {
    fn new() -> Self {
        TaskManagerState {
            next_id: 1,
            tasks: HashMap::new(),
            waiters: HashMap::new(),
        }
    }

    fn notify_waiters(&mut self, id: u64) {
        let Some(record) = self.tasks.get(&id) else { return };
        if record.status == TaskStatus::Running || record.status == TaskStatus::Pending {
            return;
        }
        if let Some(waiters) = self.waiters.remove(&id) {
            for waiter in waiters {
                let _ = waiter.send(Ok(record.status));
            }
        }
    }
}

#[async_trait]
impl crate::actor::Actor for TaskManagerState {
    type Msg = TaskMsg;

    async fn recv(&mut self, ctx: &Context<TaskMsg>, msg: TaskMsg, _sender: Option<crate::actor::Pid>) -> Result<()> {
        match msg {
            TaskMsg::Submit { agent, input, resumed_from, reply } => {
                let id = self.next_id;
                self.next_id += 1;
                let cancel = CancellationToken::new();
                self.tasks.insert(
                    id,
                    TaskRecord {
                        status: TaskStatus::Pending,
                        cancel: cancel.clone(),
                        agent: agent.clone(),
                        input: input.clone(),
                        events: Vec::new(),
                        error: None,
                        resumed_from,
                    },
                );

                let myself = ctx.myself.clone();
                tokio::spawn(async move {
                    let exec_ctx = ExecContext { cancel, branch: format!("Task.{id}") };
                    let mut reader = agent.execute(exec_ctx, input).await;
                    let outcome = loop {
                        match reader.recv().await {
                            Ok(event) => {
                                let _ = myself.tell(TaskMsg::Progress { id, event }, None).await;
                            }
                            Err(e) if e.is_end_of_stream() => break Ok(()),
                            Err(e) => break Err(e),
                        }
                    };
                    let _ = myself.tell(TaskMsg::Finished { id, outcome }, None).await;
                });

                let _ = reply.send(id);
            }
            TaskMsg::Progress { id, event } => {
                if let Some(record) = self.tasks.get_mut(&id) {
                    record.status = TaskStatus::Running;
                    record.events.push(event);
                }
            }
            TaskMsg::Finished { id, outcome } => {
                if let Some(record) = self.tasks.get_mut(&id) {
                    match outcome {
                        Ok(()) => record.status = TaskStatus::Completed,
                        Err(e) if e.is_cancelled() => record.status = TaskStatus::Stopped,
                        Err(e) => {
                            record.status = TaskStatus::Failed;
                            record.error = Some(e.to_string());
                        }
                    }
                }
                self.notify_waiters(id);
            }
            TaskMsg::Query { id, reply } => {
                let _ = reply.send(self.tasks.get(&id).map(|r| r.snapshot(id)));
            }
            TaskMsg::List { reply } => {
                let snapshots = self.tasks.iter().map(|(id, r)| r.snapshot(*id)).collect();
                let _ = reply.send(snapshots);
            }
            TaskMsg::Stop { id } => {
                if let Some(record) = self.tasks.get_mut(&id) {
                    record.cancel.cancel();
                    if record.status == TaskStatus::Pending || record.status == TaskStatus::Running {
                        record.status = TaskStatus::Stopped;
                    }
                }
                self.notify_waiters(id);
            }
            TaskMsg::Resume { id, reply } => {
                let Some(record) = self.tasks.get(&id) else {
                    let _ = reply.send(Err(CoreError::ActorNotFound(format!("task {id}"))));
                    return Ok(());
                };
                let agent = record.agent.clone();
                let input = record.input.clone();
                let new_id = self.next_id;
                self.next_id += 1;
                let cancel = CancellationToken::new();
                self.tasks.insert(
                    new_id,
                    TaskRecord {
                        status: TaskStatus::Pending,
                        cancel: cancel.clone(),
                        agent: agent.clone(),
                        input: input.clone(),
                        events: Vec::new(),
                        error: None,
                        resumed_from: Some(id),
                    },
                );
                let myself = ctx.myself.clone();
                tokio::spawn(async move {
                    let exec_ctx = ExecContext { cancel, branch: format!("Task.{new_id}") };
                    let mut reader = agent.execute(exec_ctx, input).await;
                    let outcome = loop {
                        match reader.recv().await {
                            Ok(event) => {
                                let _ = myself.tell(TaskMsg::Progress { id: new_id, event }, None).await;
                            }
                            Err(e) if e.is_end_of_stream() => break Ok(()),
                            Err(e) => break Err(e),
                        }
                    };
                    let _ = myself.tell(TaskMsg::Finished { id: new_id, outcome }, None).await;
                });
                let _ = reply.send(Ok(new_id));
            }
            TaskMsg::Wait { id, reply } => {
                match self.tasks.get(&id) {
                    None => {
                        let _ = reply.send(Err(CoreError::ActorNotFound(format!("task {id}"))));
                    }
                    Some(record) if record.status != TaskStatus::Pending && record.status != TaskStatus::Running => {
                        let _ = reply.send(Ok(record.status));
                    }
                    Some(_) => {
                        self.waiters.entry(id).or_default().push(reply);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Handle to a running task manager. Cloning shares the same underlying
/// actor and task table.
#[derive(Clone)]
pub struct TaskManager {
    actor: ActorRef<TaskMsg>,
}

impl TaskManager {
    pub fn spawn(system: &ActorSystem) -> Result<Self> {
        let props = Props::new("task-manager", TaskManagerState::new);
        let actor = system.spawn_root(props)?;
        Ok(TaskManager { actor })
    }

    pub async fn submit(&self, agent: Arc<dyn Agent>, input: AgentInput) -> Result<u64> {
        request(
            &self.actor,
            |reply| TaskMsg::Submit { agent, input, resumed_from: None, reply },
            std::time::Duration::from_secs(5),
        )
        .await
    }

    pub async fn query(&self, id: u64) -> Result<Option<TaskSnapshot>> {
        request(&self.actor, |reply| TaskMsg::Query { id, reply }, std::time::Duration::from_secs(5)).await
    }

    pub async fn list(&self) -> Result<Vec<TaskSnapshot>> {
        request(&self.actor, |reply| TaskMsg::List { reply }, std::time::Duration::from_secs(5)).await
    }

    pub fn stop(&self, id: u64) {
        if self.actor.try_tell(TaskMsg::Stop { id }, None).is_err() {
            warn!(task = id, "failed to deliver stop to task manager");
        }
    }

    pub async fn resume(&self, id: u64) -> Result<u64> {
        request(&self.actor, move |reply| TaskMsg::Resume { id, reply }, std::time::Duration::from_secs(5)).await?
    }

    pub async fn wait(&self, id: u64, timeout: std::time::Duration) -> Result<TaskStatus> {
        request(&self.actor, move |reply| TaskMsg::Wait { id, reply }, timeout).await?
    }
}
