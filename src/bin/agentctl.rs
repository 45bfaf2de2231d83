//! `agentctl`: demonstrates the core end-to-end — a supervised counter
//! actor that restarts after a panic, and a scripted sequential/parallel
//! workflow of leaf agents whose events are recorded on the event bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use nodecore::actor::{request, Actor, ActorRef, ActorSystem, Context, Pid, Props};
use nodecore::agent::{
    Agent, AgentInput, Chunk, CompletionOptions, ExecContext, LeafAgent, Provider, ProviderMessage, Response, Usage,
};
use nodecore::bus::Channel;
use nodecore::config::RuntimeConfig;
use nodecore::error::Result;
use nodecore::stream::{pipe, Reader};
use nodecore::workflow::{Parallel, Sequential};

#[derive(Parser)]
#[command(name = "agentctl", about = "Demonstrates the nodecore execution core end-to-end")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Spawn a supervised counter actor, crash it, and show it restart.
    Counter {
        #[arg(long, default_value_t = 5)]
        increments: u32,
    },
    /// Run a scripted sequential or parallel workflow of leaf agents.
    Workflow {
        #[arg(long, default_value = "sequential")]
        mode: String,
    },
    /// Run the workflow demo, then print the recorded event bus timeline.
    Timeline,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let system = ActorSystem::new("agentctl", RuntimeConfig::default());
    match command {
        Command::Counter { increments } => run_counter(&system, increments).await?,
        Command::Workflow { mode } => run_workflow(&system, &mode).await?,
        Command::Timeline => {
            run_workflow(&system, "sequential").await?;
            print_timeline(&system);
        }
    }
    system.shutdown().await;
    Ok(())
}

// --- Counter actor: supervised restart demo ---------------------------

enum CounterMsg {
    Increment,
    Boom,
    Query(oneshot::Sender<i64>),
}

struct CounterActor {
    value: i64,
}

#[async_trait]
impl Actor for CounterActor {
    type Msg = CounterMsg;

    async fn post_start(&mut self, _ctx: &Context<CounterMsg>) {
        tracing::info!(value = self.value, "counter starting");
    }

    async fn recv(&mut self, _ctx: &Context<CounterMsg>, msg: CounterMsg, _sender: Option<Pid>) -> Result<()> {
        match msg {
            CounterMsg::Increment => {
                self.value += 1;
                tracing::info!(value = self.value, "incremented");
            }
            CounterMsg::Boom => panic!("counter received a poisoned message"),
            CounterMsg::Query(reply) => {
                let _ = reply.send(self.value);
            }
        }
        Ok(())
    }
}

enum SupervisorMsg {
    GetCounter(oneshot::Sender<ActorRef<CounterMsg>>),
}

/// A thin parent whose only role is to own the counter and restart it on
/// panic with the default supervisor strategy.
struct SupervisorActor {
    counter: Option<ActorRef<CounterMsg>>,
}

#[async_trait]
impl Actor for SupervisorActor {
    type Msg = SupervisorMsg;

    async fn post_start(&mut self, ctx: &Context<SupervisorMsg>) {
        let props = Props::new("counter", || CounterActor { value: 0 });
        match ctx.spawn_child(props) {
            Ok(counter) => self.counter = Some(counter),
            Err(e) => tracing::warn!(error = %e, "failed to spawn counter"),
        }
    }

    async fn recv(&mut self, _ctx: &Context<SupervisorMsg>, msg: SupervisorMsg, _sender: Option<Pid>) -> Result<()> {
        match msg {
            SupervisorMsg::GetCounter(reply) => {
                if let Some(counter) = &self.counter {
                    let _ = reply.send(counter.clone());
                }
            }
        }
        Ok(())
    }
}

async fn run_counter(system: &ActorSystem, increments: u32) -> Result<()> {
    let supervisor = system.spawn_root(Props::new("counter-supervisor", || SupervisorActor { counter: None }))?;
    let counter = request(&supervisor, SupervisorMsg::GetCounter, Duration::from_secs(2)).await?;

    for _ in 0..increments {
        counter.tell(CounterMsg::Increment, None).await?;
    }

    counter.tell(CounterMsg::Boom, None).await?;
    // Give the supervisor time to observe the panic and restart the child.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let value = request(&counter, CounterMsg::Query, Duration::from_secs(2)).await?;
    tracing::info!(value, "counter value after restart (state was reset)");

    supervisor.stop();
    Ok(())
}

// --- Workflow demo: scripted leaf agents -------------------------------

struct ScriptedProvider {
    lines: Vec<String>,
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, _messages: &[ProviderMessage], _options: &CompletionOptions) -> Result<Response> {
        Ok(Response {
            message: ProviderMessage {
                role: "assistant".into(),
                content: Value::String(self.lines.join(" ")),
            },
            usage: Usage { input_tokens: 0, output_tokens: 0 },
        })
    }

    async fn stream(&self, _messages: &[ProviderMessage], _options: &CompletionOptions) -> Result<Reader<Chunk>> {
        let (mut writer, reader) = pipe(self.lines.len().max(1));
        let lines = self.lines.clone();
        tokio::spawn(async move {
            for line in lines {
                if writer.send(Chunk::TextDelta(line)).await {
                    return;
                }
            }
            writer.close();
        });
        Ok(reader)
    }
}

async fn run_workflow(system: &ActorSystem, mode: &str) -> Result<()> {
    let researcher: Arc<dyn Agent> = Arc::new(LeafAgent::new(
        "researcher",
        "Researcher",
        Arc::new(ScriptedProvider {
            lines: vec!["Looked up the docs.".into(), "Found three references.".into()],
        }),
    ));
    let writer_agent: Arc<dyn Agent> = Arc::new(LeafAgent::new(
        "writer",
        "Writer",
        Arc::new(ScriptedProvider {
            lines: vec!["Drafted a summary.".into()],
        }),
    ));

    let composite: Arc<dyn Agent> = if mode == "parallel" {
        Arc::new(Parallel::new("demo-parallel", vec![researcher, writer_agent]))
    } else {
        Arc::new(Sequential::new("demo-sequential", vec![researcher, writer_agent]))
    };

    let ctx = ExecContext::root();
    let input = AgentInput::text("user", "Summarize the onboarding guide.");
    let mut reader = composite.execute(ctx, input).await;

    let bus = system.bus();
    loop {
        match reader.recv().await {
            Ok(event) => {
                let envelope = bus.emit(Channel::Progress, event.content.clone());
                println!("#{} [{}] {:?}", envelope.cursor, event.branch, envelope.event);
            }
            Err(e) if e.is_end_of_stream() => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn print_timeline(system: &ActorSystem) {
    let bus = system.bus();
    for envelope in bus.timeline_range(0, 1000) {
        println!("#{} [{:?}] {:?}", envelope.cursor, envelope.channel, envelope.event);
    }
}
