//! The per-actor dispatch loop: an async `run_mailbox`/sentinel pair.
//! System messages are always drained before user messages; a panic
//! inside `recv` is caught at a barrier (`catch_unwind`, since a
//! `Drop`-based panic sentinel does not observe panics across `.await`
//! points) and reported to the parent as a `Failed` message instead of
//! unwinding the task.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::cell::{ActorRef, AnyRef, CellControl, Context, LifecycleState, TypedCellHandle};
use super::message::{Envelope, SystemMsg};
use super::pid::Pid;
use super::props::Props;
use super::queue;
use super::supervisor::{Directive, RestartBudget};
use super::system::ActorSystem;
use super::Actor;
use crate::error::CoreError;

fn set_state(state: &AtomicU8, value: LifecycleState) {
    state.store(value as u8, Ordering::Release);
}

pub(crate) struct SpawnedCell<A: Actor> {
    pub actor_ref: ActorRef<A::Msg>,
    pub any_ref: AnyRef,
}

/// Spawns `actor` as a new cell and starts its dispatch loop as a tokio
/// task. The returned cell's own child list starts empty; the caller
/// (the parent's `Context::spawn_child`, or `ActorSystem::spawn_root` for
/// top-level actors) is responsible for tracking it in its own list.
pub(crate) fn spawn<A: Actor>(
    props: Props<A>,
    pid: Pid,
    parent: Option<AnyRef>,
    system: ActorSystem,
) -> SpawnedCell<A> {
    let (user_tx, user_rx) = queue::channel::<Envelope<A::Msg>>(props.mailbox_capacity);
    let (sys_tx, sys_rx) = mpsc::channel::<SystemMsg>(256);

    let lifecycle_state = Arc::new(AtomicU8::new(LifecycleState::Starting as u8));
    let handle = TypedCellHandle::<A::Msg>::new(pid.clone(), sys_tx.clone(), lifecycle_state.clone(), props.strategy.clone());
    let any_ref: AnyRef = handle.clone();
    let mailbox_cfg = system.config().mailbox.clone();
    let actor_ref = ActorRef::new(
        pid.clone(),
        user_tx,
        any_ref.clone(),
        system.dead_letter_sink(),
        mailbox_cfg.overflow,
        mailbox_cfg.send_timeout(),
    );

    let children: Arc<Mutex<Vec<AnyRef>>> = Arc::new(Mutex::new(Vec::new()));
    let ctx = Context {
        myself: actor_ref.clone(),
        parent: parent.clone(),
        system: system.clone(),
        children: children.clone(),
    };

    system.register(&pid, any_ref.clone());

    tokio::spawn(run_cell(
        props, actor_ref.clone(), ctx, children, parent, system, user_rx, sys_rx, lifecycle_state,
    ));

    SpawnedCell { actor_ref, any_ref }
}

struct Loop<A: Actor> {
    props: Props<A>,
    actor: A,
    ctx: Context<A::Msg>,
    children: Arc<Mutex<Vec<AnyRef>>>,
    parent: Option<AnyRef>,
    system: ActorSystem,
    watchers: Vec<AnyRef>,
    restart_budgets: HashMap<u64, RestartBudget>,
    lifecycle: Arc<AtomicU8>,
}

async fn run_cell<A: Actor>(
    props: Props<A>,
    actor_ref: ActorRef<A::Msg>,
    ctx: Context<A::Msg>,
    children: Arc<Mutex<Vec<AnyRef>>>,
    parent: Option<AnyRef>,
    system: ActorSystem,
    mut user_rx: queue::MailboxRx<Envelope<A::Msg>>,
    mut sys_rx: mpsc::Receiver<SystemMsg>,
    lifecycle: Arc<AtomicU8>,
) {
    let pid = actor_ref.pid().clone();
    let actor = (props.producer)();
    let mut state = Loop {
        props,
        actor,
        ctx,
        children,
        parent,
        system,
        watchers: Vec::new(),
        restart_budgets: HashMap::new(),
        lifecycle,
    };

    debug!(actor = %pid, "starting");
    state.actor.pre_start(&state.ctx).await;
    state.actor.post_start(&state.ctx).await;
    set_state(&state.lifecycle, LifecycleState::Running);

    'dispatch: loop {
        tokio::select! {
            biased;
            sys = sys_rx.recv() => {
                match sys {
                    Some(SystemMsg::PoisonPill) | Some(SystemMsg::Stopping) => {
                        finalize_stop(&mut state, &pid, &mut sys_rx).await;
                        break 'dispatch;
                    }
                    Some(SystemMsg::Watch(watcher_pid, watcher_ref)) => {
                        debug!(actor = %pid, watcher = %watcher_pid, "watch registered");
                        state.watchers.push(watcher_ref);
                    }
                    Some(SystemMsg::Unwatch(watcher_pid)) => {
                        state.watchers.retain(|w| w.pid() != &watcher_pid);
                    }
                    Some(SystemMsg::Stopped(child_pid)) => {
                        state.children.lock().unwrap().retain(|c| c.pid() != &child_pid);
                    }
                    Some(SystemMsg::Failed(child_pid, err)) => {
                        handle_child_failure(&mut state, &child_pid, &err).await;
                    }
                    Some(_) | None => {}
                }
            }
            msg = user_rx.recv() => {
                match msg {
                    Some(envelope) => {
                        if !process_user_message(&mut state, &pid, envelope, &mut sys_rx, &mut user_rx).await {
                            break 'dispatch;
                        }
                    }
                    None => break 'dispatch,
                }
            }
        }
    }

    debug!(actor = %pid, "stopped");
}

/// Runs one `recv` call behind a panic barrier. Returns `false` if the
/// actor should stop (an escalated or directive-less failure at the
/// root).
async fn process_user_message<A: Actor>(
    state: &mut Loop<A>,
    pid: &Pid,
    envelope: Envelope<A::Msg>,
    sys_rx: &mut mpsc::Receiver<SystemMsg>,
    user_rx: &mut queue::MailboxRx<Envelope<A::Msg>>,
) -> bool {
    let fut = state.actor.recv(&state.ctx, envelope.msg, envelope.sender);
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(actor = %pid, error = %err, "recv returned an application error");
            true
        }
        Err(panic) => {
            let message = panic_message(panic);
            warn!(actor = %pid, panic = %message, "actor panicked");
            let err = CoreError::Panic(message);
            if let Some(parent) = &state.parent {
                parent.tell_system(SystemMsg::Failed(pid.clone(), err));
                await_directive(state, pid, sys_rx, user_rx).await
            } else {
                // Root actors have no supervisor; treat as Stop.
                finalize_stop(state, pid, sys_rx).await;
                false
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Blocks on the parent's directive after reporting a panic, applying it.
/// Returns `false` if the cell has fully stopped as a result.
async fn await_directive<A: Actor>(
    state: &mut Loop<A>,
    pid: &Pid,
    sys_rx: &mut mpsc::Receiver<SystemMsg>,
    user_rx: &mut queue::MailboxRx<Envelope<A::Msg>>,
) -> bool {
    loop {
        match sys_rx.recv().await {
            Some(SystemMsg::Resume) => return true,
            Some(SystemMsg::Restarting) => {
                do_restart(state, pid, sys_rx, user_rx).await;
                return true;
            }
            Some(SystemMsg::PoisonPill) | Some(SystemMsg::Stopping) => {
                finalize_stop(state, pid, sys_rx).await;
                return false;
            }
            Some(SystemMsg::Watch(watcher_pid, watcher_ref)) => {
                state.watchers.push(watcher_ref);
                let _ = watcher_pid;
            }
            Some(SystemMsg::Unwatch(watcher_pid)) => {
                state.watchers.retain(|w| w.pid() != &watcher_pid);
            }
            Some(SystemMsg::Stopped(child_pid)) => {
                state.children.lock().unwrap().retain(|c| c.pid() != &child_pid);
            }
            Some(_) => continue,
            None => return false,
        }
    }
}

/// A parent cell decides the directive for a failed child and applies it.
/// The child's own `Props::with_strategy` override, if it set one, takes
/// precedence over this actor's `Actor::supervisor_strategy()` default.
async fn handle_child_failure<A: Actor>(state: &mut Loop<A>, child_pid: &Pid, err: &CoreError) {
    let child_ref = {
        let children = state.children.lock().unwrap();
        children.iter().find(|c| c.pid() == child_pid).cloned()
    };
    let Some(child_ref) = child_ref else {
        return;
    };

    let strategy = child_ref.supervisor_override().unwrap_or_else(|| state.actor.supervisor_strategy());
    let directive = strategy.decide(err);

    let budget = state
        .restart_budgets
        .entry(child_pid.id())
        .or_insert_with(RestartBudget::default);
    let within_budget = budget.record_and_check(&strategy);

    let effective = if directive == Directive::Restart && !within_budget {
        Directive::Escalate
    } else {
        directive
    };

    match effective {
        Directive::Resume => child_ref.tell_system(SystemMsg::Resume),
        Directive::Restart => child_ref.tell_system(SystemMsg::Restarting),
        Directive::Stop => child_ref.tell_system(SystemMsg::PoisonPill),
        Directive::Escalate => {
            warn!(child = %child_pid, "escalating failure");
            child_ref.tell_system(SystemMsg::PoisonPill);
            if let Some(parent) = &state.parent {
                parent.tell_system(SystemMsg::Failed(state.ctx.myself.pid().clone(), err.clone()));
            } else {
                warn!(child = %child_pid, error = %err, "unhandled escalation at root");
            }
        }
    }
}

/// Cascades a stop to children (if any), waits for them to report
/// `Stopped`, then runs `post_stop`, notifies watchers, and deregisters.
async fn finalize_stop<A: Actor>(
    state: &mut Loop<A>,
    pid: &Pid,
    sys_rx: &mut mpsc::Receiver<SystemMsg>,
) {
    set_state(&state.lifecycle, LifecycleState::Stopping);
    drain_children(state, pid, sys_rx).await;
    state.actor.post_stop(&state.ctx).await;
    if let Some(parent) = &state.parent {
        parent.tell_system(SystemMsg::Stopped(pid.clone()));
    }
    for watcher in &state.watchers {
        watcher.tell_system(SystemMsg::Terminated(pid.clone()));
    }
    state.system.deregister(pid);
    set_state(&state.lifecycle, LifecycleState::Stopped);
}

async fn drain_children<A: Actor>(
    state: &mut Loop<A>,
    pid: &Pid,
    sys_rx: &mut mpsc::Receiver<SystemMsg>,
) {
    let pending: Vec<AnyRef> = state.children.lock().unwrap().clone();
    if pending.is_empty() {
        return;
    }
    for child in &pending {
        child.tell_system(SystemMsg::PoisonPill);
    }
    let mut remaining: std::collections::HashSet<u64> = pending.iter().map(|c| c.pid().id()).collect();
    while !remaining.is_empty() {
        match sys_rx.recv().await {
            Some(SystemMsg::Stopped(child_pid)) => {
                remaining.remove(&child_pid.id());
                state.children.lock().unwrap().retain(|c| c.pid() != &child_pid);
            }
            Some(_) => continue,
            None => {
                warn!(actor = %pid, "system channel closed while draining children");
                break;
            }
        }
    }
}

async fn do_restart<A: Actor>(
    state: &mut Loop<A>,
    pid: &Pid,
    sys_rx: &mut mpsc::Receiver<SystemMsg>,
    user_rx: &mut queue::MailboxRx<Envelope<A::Msg>>,
) {
    set_state(&state.lifecycle, LifecycleState::Restarting);
    drain_children(state, pid, sys_rx).await;
    if state.props.reset_mailbox_on_restart {
        while user_rx.try_recv().is_some() {}
    }
    state.actor.pre_restart(&state.ctx).await;
    state.actor = (state.props.producer)();
    state.actor.pre_start(&state.ctx).await;
    state.actor.post_start(&state.ctx).await;
    set_state(&state.lifecycle, LifecycleState::Running);
    debug!(actor = %pid, "restarted");
}
