//! Cross-cutting integration scenarios that exercise the actor runtime,
//! workflow composer and event bus together rather than one module in
//! isolation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use nodecore::actor::{request, Actor, ActorRef, ActorSystem, Context, Directive, Pid, Props, Strategy};
use nodecore::agent::{Agent, AgentEvent, AgentInput, ExecContext};
use nodecore::bus::{Channel, EventBus, EventPayload};
use nodecore::config::{BusConfig, MailboxConfig, OverflowPolicy, RuntimeConfig};
use nodecore::error::{CoreError, Result};
use nodecore::stream::{pipe, Reader};
use nodecore::workflow::{LoopAgent, Node, Parallel, Router, RouterMode, Sequential, StepsGroup};

// --- Request/response -----------------------------------------------

enum EchoMsg {
    Ping { count: u32, reply: oneshot::Sender<u32> },
}

struct EchoActor;

#[async_trait]
impl Actor for EchoActor {
    type Msg = EchoMsg;

    async fn recv(&mut self, _ctx: &Context<EchoMsg>, msg: EchoMsg, _sender: Option<Pid>) -> Result<()> {
        let EchoMsg::Ping { count, reply } = msg;
        let _ = reply.send(count);
        Ok(())
    }
}

#[tokio::test]
async fn request_response_returns_reply() {
    let system = ActorSystem::new("echo-system", RuntimeConfig::default());
    let echo = system.spawn_root(Props::new("echo", || EchoActor)).unwrap();

    let pong = request(&echo, |reply| EchoMsg::Ping { count: 42, reply }, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(pong, 42);
    system.shutdown().await;
}

// --- Supervised restart ------------------------------------------------

enum FlakyMsg {
    Ping { count: u32, reply: oneshot::Sender<u32> },
}

/// Rejects any ping below `count: 3` by panicking; the decision depends
/// only on the message, not on actor-local state, so it survives a
/// restart (which resets the actor's own fields) unchanged.
struct FlakyActor;

#[async_trait]
impl Actor for FlakyActor {
    type Msg = FlakyMsg;

    async fn recv(&mut self, _ctx: &Context<FlakyMsg>, msg: FlakyMsg, _sender: Option<Pid>) -> Result<()> {
        let FlakyMsg::Ping { count, reply } = msg;
        if count < 3 {
            panic!("flaky actor rejects count < 3");
        }
        let _ = reply.send(count);
        Ok(())
    }
}

enum RestartSupervisorMsg {
    GetChild(oneshot::Sender<ActorRef<FlakyMsg>>),
}

struct RestartSupervisor {
    child: Option<ActorRef<FlakyMsg>>,
}

#[async_trait]
impl Actor for RestartSupervisor {
    type Msg = RestartSupervisorMsg;

    async fn post_start(&mut self, ctx: &Context<RestartSupervisorMsg>) {
        self.child = ctx.spawn_child(Props::new("flaky", || FlakyActor)).ok();
    }

    async fn recv(&mut self, _ctx: &Context<RestartSupervisorMsg>, msg: RestartSupervisorMsg, _sender: Option<Pid>) -> Result<()> {
        let RestartSupervisorMsg::GetChild(reply) = msg;
        if let Some(child) = &self.child {
            let _ = reply.send(child.clone());
        }
        Ok(())
    }
}

#[tokio::test]
async fn supervised_actor_restarts_and_keeps_serving() {
    let system = ActorSystem::new("restart-system", RuntimeConfig::default());
    let supervisor = system
        .spawn_root(Props::new("supervisor", || RestartSupervisor { child: None }))
        .unwrap();
    let child = request(&supervisor, RestartSupervisorMsg::GetChild, Duration::from_secs(1))
        .await
        .unwrap();

    for count in [1u32, 2, 3] {
        let outcome = request(&child, move |reply| FlakyMsg::Ping { count, reply }, Duration::from_millis(500)).await;
        if count < 3 {
            // the panicking ping never replies; its oneshot sender is
            // dropped during unwind, so the request fails fast.
            assert!(outcome.is_err());
        } else {
            assert_eq!(outcome.unwrap(), 3);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    system.shutdown().await;
}

// --- Concurrent counter --------------------------------------------

enum CounterMsg {
    Increment,
    GetCount(oneshot::Sender<u64>),
}

struct CounterActor {
    count: u64,
}

#[async_trait]
impl Actor for CounterActor {
    type Msg = CounterMsg;

    async fn recv(&mut self, _ctx: &Context<CounterMsg>, msg: CounterMsg, _sender: Option<Pid>) -> Result<()> {
        match msg {
            CounterMsg::Increment => self.count += 1,
            CounterMsg::GetCount(reply) => {
                let _ = reply.send(self.count);
            }
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_reach_expected_total() {
    let system = ActorSystem::new("counter-system", RuntimeConfig::default());
    let counter = system.spawn_root(Props::new("counter", || CounterActor { count: 0 })).unwrap();

    let mut handles = Vec::with_capacity(100);
    for _ in 0..100 {
        let counter = counter.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                counter.tell(CounterMsg::Increment, None).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = request(&counter, CounterMsg::GetCount, Duration::from_secs(1)).await.unwrap();
    assert_eq!(total, 10_000);
    system.shutdown().await;
}

// --- Workflow composer: sequential and parallel ------------------------

/// A test double for a leaf agent: emits exactly one event, optionally
/// after a delay, then closes its stream.
struct OneShotAgent {
    name: String,
    payload: EventPayload,
    delay: Duration,
}

impl OneShotAgent {
    fn new(name: impl Into<String>, payload: EventPayload) -> Self {
        OneShotAgent { name: name.into(), payload, delay: Duration::ZERO }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Agent for OneShotAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: ExecContext, _input: AgentInput) -> Reader<AgentEvent> {
        let (mut writer, reader) = pipe(4);
        let name = self.name.clone();
        let payload = self.payload.clone();
        let delay = self.delay;
        let branch = ctx.branch.clone();

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let event = AgentEvent::new(&name, &name, &branch, payload);
            if writer.send(event).await {
                return;
            }
            writer.close();
        });

        reader
    }
}

fn root_ctx(branch: &str) -> ExecContext {
    ExecContext {
        cancel: CancellationToken::new(),
        branch: branch.to_string(),
    }
}

#[tokio::test]
async fn sequential_workflow_stamps_total_steps_and_order() {
    let children: Vec<Arc<dyn Agent>> = vec![
        Arc::new(OneShotAgent::new("StageA", EventPayload::Custom(json!({ "stage": "A" })))),
        Arc::new(OneShotAgent::new("StageB", EventPayload::Custom(json!({ "stage": "B" })))),
        Arc::new(OneShotAgent::new("StageC", EventPayload::Custom(json!({ "stage": "C" })))),
    ];
    let sequential = Sequential::new("pipeline", children);

    let mut reader = sequential.execute(root_ctx("Parent"), AgentInput::text("user", "go")).await;

    let mut order = Vec::new();
    loop {
        match reader.recv().await {
            Ok(event) => {
                assert_eq!(event.metadata.get("total_steps"), Some(&json!(3)));
                order.push((event.agent_id.clone(), event.branch.clone()));
            }
            Err(e) if e.is_end_of_stream() => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(
        order,
        vec![
            ("StageA".to_string(), "Parent.StageA".to_string()),
            ("StageB".to_string(), "Parent.StageB".to_string()),
            ("StageC".to_string(), "Parent.StageC".to_string()),
        ]
    );
}

#[tokio::test]
async fn parallel_workflow_merges_all_children() {
    let children: Vec<Arc<dyn Agent>> = vec![
        Arc::new(OneShotAgent::new("Fast", EventPayload::Custom(json!({ "speed": "fast" }))).with_delay(Duration::from_millis(10))),
        Arc::new(OneShotAgent::new("Medium", EventPayload::Custom(json!({ "speed": "medium" }))).with_delay(Duration::from_millis(30))),
        Arc::new(OneShotAgent::new("Slow", EventPayload::Custom(json!({ "speed": "slow" }))).with_delay(Duration::from_millis(60))),
    ];
    let parallel = Parallel::new("fan-out", children);

    let mut reader = parallel.execute(root_ctx("Parent"), AgentInput::text("user", "go")).await;

    let mut indices = Vec::new();
    loop {
        match reader.recv().await {
            Ok(event) => {
                let index = event.metadata.get("parallel_index").and_then(|v| v.as_u64()).unwrap();
                indices.push(index);
            }
            Err(e) if e.is_end_of_stream() => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(indices.len(), 3);
    assert_eq!(indices[0], 0, "the fast child should be merged in first");
    let mut distinct = indices.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct, vec![0, 1, 2]);
}

// --- Event bus -------------------------------------------------------

#[tokio::test]
async fn event_bus_evicts_oldest_past_max_size() {
    let bus = EventBus::new(BusConfig {
        max_size: 5,
        max_age_secs: 0,
        cleanup_interval_millis: 50,
        subscriber_buffer: 16,
    });

    let mut cursors = Vec::with_capacity(10);
    for i in 0..10 {
        let envelope = bus.emit(Channel::Monitor, EventPayload::Custom(json!({ "i": i })));
        cursors.push(envelope.cursor);
    }

    assert_eq!(bus.timeline_count(), 5);
    let retained: Vec<u64> = bus.timeline_range(0, 10).iter().map(|e| e.cursor).collect();
    assert_eq!(retained, cursors[5..].to_vec());

    bus.close().await;
}

#[tokio::test]
async fn event_bus_evicts_envelopes_past_max_age() {
    let bus = EventBus::new(BusConfig {
        max_size: 0,
        max_age_secs: 1,
        cleanup_interval_millis: 50,
        subscriber_buffer: 16,
    });

    bus.emit(Channel::Monitor, EventPayload::Custom(json!({ "i": 0 })));
    bus.emit(Channel::Monitor, EventPayload::Custom(json!({ "i": 1 })));

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let kept = bus.emit(Channel::Monitor, EventPayload::Custom(json!({ "i": 2 })));

    assert_eq!(bus.timeline_count(), 1);
    let remaining = bus.timeline_range(0, 10);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].cursor, kept.cursor);

    bus.close().await;
}

// --- Dead letters -----------------------------------------------------

enum SinkMsg {
    Noop,
}

struct SinkActor;

#[async_trait]
impl Actor for SinkActor {
    type Msg = SinkMsg;

    async fn recv(&mut self, _ctx: &Context<SinkMsg>, _msg: SinkMsg, _sender: Option<Pid>) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn stopped_actor_send_publishes_dead_letter() {
    let system = ActorSystem::new("dead-letter-system", RuntimeConfig::default());
    let sink = system.spawn_root(Props::new("sink", || SinkActor)).unwrap();
    let mut letters = system.dead_letters();

    sink.stop();
    // give the mailbox loop time to drain PoisonPill and close the channel
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(sink.tell(SinkMsg::Noop, None).await.is_err());

    let letter = tokio::time::timeout(Duration::from_secs(1), letters.recv()).await.unwrap().unwrap();
    assert_eq!(letter.recipient, sink.pid().to_string());

    system.shutdown().await;
}

#[tokio::test]
async fn slow_subscriber_does_not_block_fast_subscriber() {
    let bus = EventBus::new(BusConfig {
        max_size: 10_000,
        max_age_secs: 0,
        cleanup_interval_millis: 200,
        subscriber_buffer: 256,
    });

    let mut slow = bus.subscribe_buffered([Channel::Progress], None, 1);
    let mut fast = bus.subscribe_buffered([Channel::Progress], None, 2048);

    for i in 0..1000 {
        bus.emit(Channel::Progress, EventPayload::Custom(json!({ "i": i })));
    }

    for _ in 0..1000 {
        assert!(fast.recv().await.is_some());
    }

    assert!(slow.recv().await.is_some());
    assert_eq!(slow.dropped_count(), 999);

    bus.close().await;
}

// --- Name collisions ---------------------------------------------------

struct NoopActor;

#[async_trait]
impl Actor for NoopActor {
    type Msg = SinkMsg;

    async fn recv(&mut self, _ctx: &Context<SinkMsg>, _msg: SinkMsg, _sender: Option<Pid>) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn duplicate_name_spawns_are_suffixed_by_default() {
    let system = ActorSystem::new("naming-system", RuntimeConfig::default());
    let first = system.spawn_root(Props::new("worker", || NoopActor)).unwrap();
    let second = system.spawn_root(Props::new("worker", || NoopActor)).unwrap();
    let third = system.spawn_root(Props::new("worker", || NoopActor)).unwrap();

    assert_eq!(first.pid().path(), "/user/worker");
    assert_eq!(second.pid().path(), "/user/worker-2");
    assert_eq!(third.pid().path(), "/user/worker-3");

    system.shutdown().await;
}

#[tokio::test]
async fn strict_unique_naming_fails_spawn_on_collision() {
    let config = RuntimeConfig {
        strict_unique_naming: true,
        ..RuntimeConfig::default()
    };
    let system = ActorSystem::new("strict-naming-system", config);
    system.spawn_root(Props::new("worker", || NoopActor)).unwrap();

    let collision = system.spawn_root(Props::new("worker", || NoopActor));
    assert!(matches!(collision, Err(CoreError::DuplicateName(path)) if path == "/user/worker"));

    system.shutdown().await;
}

// --- Mailbox overflow policies -----------------------------------------

struct GateMsg(i32);

/// Blocks on `gate` the first time it receives a message, so the test
/// driving it can fill the mailbox up behind that first in-flight
/// message before releasing it.
struct GateActor {
    gate: Arc<Notify>,
    gated_once: bool,
    received: Arc<Mutex<Vec<i32>>>,
}

#[async_trait]
impl Actor for GateActor {
    type Msg = GateMsg;

    async fn recv(&mut self, _ctx: &Context<GateMsg>, msg: GateMsg, _sender: Option<Pid>) -> Result<()> {
        if !self.gated_once {
            self.gated_once = true;
            self.gate.notified().await;
        }
        self.received.lock().unwrap().push(msg.0);
        Ok(())
    }
}

#[tokio::test]
async fn drop_newest_overflow_policy_drops_the_incoming_message() {
    let config = RuntimeConfig {
        mailbox: MailboxConfig {
            overflow: OverflowPolicy::DropNewest,
            ..MailboxConfig::default()
        },
        ..RuntimeConfig::default()
    };
    let system = ActorSystem::new("drop-newest-system", config);
    let gate = Arc::new(Notify::new());
    let received = Arc::new(Mutex::new(Vec::new()));
    let (gate_for_actor, received_for_actor) = (gate.clone(), received.clone());
    let actor = system
        .spawn_root(
            Props::new("gate", move || GateActor {
                gate: gate_for_actor.clone(),
                gated_once: false,
                received: received_for_actor.clone(),
            })
            .with_mailbox_capacity(1),
        )
        .unwrap();
    let mut letters = system.dead_letters();

    actor.tell(GateMsg(1), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    actor.tell(GateMsg(2), None).await.unwrap();
    actor.tell(GateMsg(3), None).await.unwrap();

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(*received.lock().unwrap(), vec![1, 2]);
    let letter = tokio::time::timeout(Duration::from_secs(1), letters.recv()).await.unwrap().unwrap();
    assert!(letter.reason.contains("dropped newest"), "unexpected reason: {}", letter.reason);

    system.shutdown().await;
}

#[tokio::test]
async fn drop_oldest_overflow_policy_evicts_the_oldest_queued_message() {
    let config = RuntimeConfig {
        mailbox: MailboxConfig {
            overflow: OverflowPolicy::DropOldest,
            ..MailboxConfig::default()
        },
        ..RuntimeConfig::default()
    };
    let system = ActorSystem::new("drop-oldest-system", config);
    let gate = Arc::new(Notify::new());
    let received = Arc::new(Mutex::new(Vec::new()));
    let (gate_for_actor, received_for_actor) = (gate.clone(), received.clone());
    let actor = system
        .spawn_root(
            Props::new("gate", move || GateActor {
                gate: gate_for_actor.clone(),
                gated_once: false,
                received: received_for_actor.clone(),
            })
            .with_mailbox_capacity(1),
        )
        .unwrap();
    let mut letters = system.dead_letters();

    actor.tell(GateMsg(1), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    actor.tell(GateMsg(2), None).await.unwrap();
    actor.tell(GateMsg(3), None).await.unwrap();

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(*received.lock().unwrap(), vec![1, 3]);
    let letter = tokio::time::timeout(Duration::from_secs(1), letters.recv()).await.unwrap().unwrap();
    assert!(letter.reason.contains("dropped oldest"), "unexpected reason: {}", letter.reason);

    system.shutdown().await;
}

// --- Per-child supervisor strategy override -----------------------------

enum OverriddenChildMsg {
    Boom,
}

struct OverriddenChildActor;

#[async_trait]
impl Actor for OverriddenChildActor {
    type Msg = OverriddenChildMsg;

    async fn recv(&mut self, _ctx: &Context<OverriddenChildMsg>, _msg: OverriddenChildMsg, _sender: Option<Pid>) -> Result<()> {
        panic!("always fails");
    }
}

enum OverrideParentMsg {
    GetChild(oneshot::Sender<ActorRef<OverriddenChildMsg>>),
}

struct OverrideParentActor {
    child: Option<ActorRef<OverriddenChildMsg>>,
}

#[async_trait]
impl Actor for OverrideParentActor {
    type Msg = OverrideParentMsg;

    // The parent's own default strategy is Restart, same as every actor
    // that doesn't override `supervisor_strategy`; the child's own
    // `Props::with_strategy(Stop)` should win anyway.
    async fn post_start(&mut self, ctx: &Context<OverrideParentMsg>) {
        let strategy = Strategy::new(Arc::new(|_| Directive::Stop), 5, Duration::from_secs(60));
        self.child = ctx
            .spawn_child(Props::new("flaky-child", || OverriddenChildActor).with_strategy(strategy))
            .ok();
    }

    async fn recv(&mut self, _ctx: &Context<OverrideParentMsg>, msg: OverrideParentMsg, _sender: Option<Pid>) -> Result<()> {
        let OverrideParentMsg::GetChild(reply) = msg;
        if let Some(child) = &self.child {
            let _ = reply.send(child.clone());
        }
        Ok(())
    }
}

#[tokio::test]
async fn child_strategy_override_takes_precedence_over_parent_default() {
    let system = ActorSystem::new("override-system", RuntimeConfig::default());
    let parent = system
        .spawn_root(Props::new("override-parent", || OverrideParentActor { child: None }))
        .unwrap();
    let child = request(&parent, OverrideParentMsg::GetChild, Duration::from_secs(1)).await.unwrap();

    child.try_tell(OverriddenChildMsg::Boom, None).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The parent's own default strategy would have restarted the child
    // (back to `Running`); the per-spawn override picks `Stop` instead.
    assert_eq!(child.lifecycle_state(), nodecore::actor::LifecycleState::Stopped);

    system.shutdown().await;
}

// --- Lifecycle state observability --------------------------------------

#[tokio::test]
async fn lifecycle_state_returns_to_running_after_a_supervised_restart() {
    let system = ActorSystem::new("lifecycle-system", RuntimeConfig::default());
    let supervisor = system
        .spawn_root(Props::new("lifecycle-supervisor", || RestartSupervisor { child: None }))
        .unwrap();
    let child = request(&supervisor, RestartSupervisorMsg::GetChild, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(child.lifecycle_state(), nodecore::actor::LifecycleState::Running);

    let _ = request(&child, |reply| FlakyMsg::Ping { count: 1, reply }, Duration::from_millis(500)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(child.lifecycle_state(), nodecore::actor::LifecycleState::Running);

    system.shutdown().await;
}

// --- workflow::Node tagging ----------------------------------------------

#[tokio::test]
async fn workflow_composites_report_their_node_kind() {
    let leaf = OneShotAgent::new("leaf", EventPayload::Custom(json!({})));
    assert_eq!(leaf.kind(), Node::Leaf);

    let sequential = Sequential::new("seq", Vec::new());
    assert_eq!(sequential.kind(), Node::Sequential);

    let parallel = Parallel::new("par", Vec::new());
    assert_eq!(parallel.kind(), Node::Parallel);

    let loop_agent = LoopAgent::new("loop", Vec::new());
    assert_eq!(loop_agent.kind(), Node::Loop);

    let router = Router::new(
        "router",
        std::collections::HashMap::new(),
        RouterMode::Chain(Arc::new(|_| Vec::new())),
    );
    assert_eq!(router.kind(), Node::Router);

    let steps = StepsGroup::new("steps", Vec::new());
    assert_eq!(steps.kind(), Node::StepsGroup);
}
