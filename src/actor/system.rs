//! The actor system: a process-wide singleton address space (name, start
//! time, config, root children) with a two-phase `shutdown()` (stop
//! accepting new work, then wait for the user root to drain).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info};

use super::cell::AnyRef;
use super::dead_letter::{DeadLetter, DeadLetterSink};
use super::mailbox::{self, SpawnedCell};
use super::pid::Pid;
use super::props::Props;
use super::Actor;
use crate::bus::EventBus;
use crate::config::RuntimeConfig;
use crate::error::{CoreError, Result};

struct Inner {
    name: String,
    started_at: Instant,
    config: RuntimeConfig,
    registry: DashMap<String, AnyRef>,
    root_children: Mutex<Vec<AnyRef>>,
    bus: Arc<EventBus>,
    dead_letters: DeadLetterSink,
    next_tmp: AtomicU64,
}

/// A cheaply-cloneable handle to the running actor system. Every clone
/// refers to the same registry, root, and bus.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<Inner>,
}

impl ActorSystem {
    pub fn new(name: impl Into<String>, config: RuntimeConfig) -> Self {
        let name = name.into();
        if config.debug {
            info!(system = %name, "starting actor system");
        }
        let bus = Arc::new(EventBus::new(config.bus.clone()));
        ActorSystem {
            inner: Arc::new(Inner {
                name,
                started_at: Instant::now(),
                config,
                registry: DashMap::new(),
                root_children: Mutex::new(Vec::new()),
                bus,
                dead_letters: DeadLetterSink::new(),
                next_tmp: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.inner.started_at.elapsed()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.inner.bus.clone()
    }

    /// Subscribes to messages the runtime could not deliver (target
    /// stopped, or a full mailbox under the configured overflow policy).
    pub fn dead_letters(&self) -> tokio::sync::broadcast::Receiver<DeadLetter> {
        self.inner.dead_letters.subscribe()
    }

    pub(crate) fn dead_letter_sink(&self) -> DeadLetterSink {
        self.inner.dead_letters.clone()
    }

    pub(crate) fn register(&self, pid: &Pid, any_ref: AnyRef) {
        self.inner.registry.insert(pid.path().to_string(), any_ref);
    }

    pub(crate) fn deregister(&self, pid: &Pid) {
        self.inner.registry.remove(pid.path());
    }

    /// Looks up a live actor by its full path (`ActorSelection`).
    pub fn select(&self, path: &str) -> Option<AnyRef> {
        self.inner.registry.get(path).map(|e| e.value().clone())
    }

    /// Resolves `base_path` to a path not currently in the registry.
    /// Under the default (non-strict) policy, a collision is resolved by
    /// suffixing (`-2`, `-3`, ...) rather than failing; `strict_unique_naming`
    /// makes any collision a hard `DuplicateName` error instead.
    fn reserve(&self, base_path: &str) -> Result<String> {
        if !self.inner.registry.contains_key(base_path) {
            return Ok(base_path.to_string());
        }
        if self.inner.config.strict_unique_naming {
            return Err(CoreError::DuplicateName(base_path.to_string()));
        }
        let mut suffix = 2u32;
        loop {
            let candidate = format!("{base_path}-{suffix}");
            if !self.inner.registry.contains_key(&candidate) {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    /// Spawns a top-level actor under `/user`.
    pub fn spawn_root<A: Actor>(&self, props: Props<A>) -> Result<super::ActorRef<A::Msg>> {
        let base = format!("/user/{}", props.name);
        let path = self.reserve(&base)?;
        let pid = Pid::new(path);
        let spawned: SpawnedCell<A> = mailbox::spawn(props, pid, None, self.clone());
        self.inner.root_children.lock().unwrap().push(spawned.any_ref.clone());
        Ok(spawned.actor_ref)
    }

    /// Spawns a child of `parent_path`/`parent_any`. Used by
    /// `Context::spawn_child`; not called directly by application code.
    pub(crate) fn spawn_child<A: Actor>(
        &self,
        parent_path: &str,
        parent_any: AnyRef,
        props: Props<A>,
    ) -> Result<SpawnedCell<A>> {
        let base = format!("{parent_path}/{}", props.name);
        let path = self.reserve(&base)?;
        let pid = Pid::new(path);
        Ok(mailbox::spawn(props, pid, Some(parent_any), self.clone()))
    }

    /// Allocates a name-scoped id for ephemeral actors (e.g. the
    /// temporary reply actors behind `request`).
    pub(crate) fn next_tmp_id(&self) -> u64 {
        self.inner.next_tmp.fetch_add(1, Ordering::Relaxed)
    }

    /// Stops every root actor and waits (bounded by the configured
    /// shutdown deadline) for the tree to drain before closing the bus.
    pub async fn shutdown(&self) {
        debug!(system = %self.inner.name, "shutdown: stopping root actors");
        let roots: Vec<AnyRef> = self.inner.root_children.lock().unwrap().clone();
        for root in &roots {
            root.tell_system(super::message::SystemMsg::PoisonPill);
        }

        let deadline = self.inner.config.shutdown_deadline();
        let waited = tokio::time::timeout(deadline, async {
            loop {
                if self.inner.registry.is_empty() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;

        if waited.is_err() {
            debug!(system = %self.inner.name, "shutdown deadline elapsed with actors still draining");
        }

        self.inner.bus.close().await;
    }
}
