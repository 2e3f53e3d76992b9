// packages/dispatch/src/main.rs
//! Custom Queue Dispatch Demo
//!
//! Runs the same demo agent on a single-thread dispatcher with three
//! queue policies and prints the order in which its events are handled:
//!
//! - `simple_fifo`: arrival order
//! - `hardcoded_priorities`: a fixed classifier (Bye before Hello)
//! - `dynamic_per_agent_priorities`: per-agent tables, Alice and Bob disagree
//! - `separate_queues`: one dispatcher, a FIFO binder for Alice and a
//!   priority binder for Bob

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use custom_queue_dispatch::observability::{init_metrics, init_tracing};
use custom_queue_dispatch::{
    AgentPriorities, AgentRef, BindingHandle, Demand, DemandKind, Dispatcher, DispatcherConfig,
    DispatcherRegistry, FifoQueue, Priority, PriorityQueue, SingleThreadDispatcher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long a scenario may take before the demo gives up waiting
const SCENARIO_TIMEOUT: Duration = Duration::from_secs(10);

struct Hello;
struct Bye;
struct Complete;

/// Agent that greets itself, says goodbye, then unbinds
#[derive(Clone)]
struct DemoAgent {
    agent: AgentRef,
    handle: BindingHandle,
    dispatcher: Arc<dyn Dispatcher>,
    finished: Sender<String>,
}

impl DemoAgent {
    /// Bind a new agent to `dispatcher_name` and queue its start demand
    fn launch(
        registry: &DispatcherRegistry,
        dispatcher_name: &str,
        agent: AgentRef,
        finished: Sender<String>,
    ) -> Result<()> {
        let dispatcher = registry
            .get(dispatcher_name)
            .with_context(|| format!("dispatcher '{}' is not registered", dispatcher_name))?;
        let handle = registry.bind(dispatcher_name, &agent)?;
        Self::launch_with(handle, dispatcher, agent, finished)
    }

    /// Queue the start demand for an agent that is already bound
    fn launch_with(
        handle: BindingHandle,
        dispatcher: Arc<dyn Dispatcher>,
        agent: AgentRef,
        finished: Sender<String>,
    ) -> Result<()> {
        let this = DemoAgent {
            agent,
            handle,
            dispatcher,
            finished,
        };

        let start = this.clone();
        this.handle.push_start(move || start.on_start())?;
        Ok(())
    }

    fn on_start(self) -> Result<()> {
        self.print("so_evt_start");

        let hello = self.clone();
        self.handle.send_message::<Hello, _>(move || hello.on_hello())?;
        let bye = self.clone();
        self.handle.send_message::<Bye, _>(move || bye.on_bye())?;
        let complete = self.clone();
        self.handle.send_message::<Complete, _>(move || complete.on_complete())?;
        Ok(())
    }

    fn on_hello(self) -> Result<()> {
        self.print("hello");
        Ok(())
    }

    fn on_bye(self) -> Result<()> {
        self.print("bye");
        Ok(())
    }

    fn on_complete(self) -> Result<()> {
        self.print("complete");

        // Queued before unbind so the drain still delivers it
        let finish = self.clone();
        self.handle.push_finish(move || finish.on_finish())?;
        self.dispatcher.unbind(&self.agent)?;
        Ok(())
    }

    fn on_finish(self) -> Result<()> {
        self.print("so_evt_finish");
        self.finished.send(self.agent.name().to_string())?;
        Ok(())
    }

    fn print(&self, event: &str) {
        println!("  [{}] {}", self.agent, event);
    }
}

fn scenario_config(base: &DispatcherConfig, scenario: &str) -> DispatcherConfig {
    let named = DispatcherConfig::named(scenario);
    DispatcherConfig {
        name: named.name,
        thread_name: named.thread_name,
        ..base.clone()
    }
}

/// Wait for every launched agent to report its finish demand
fn wait_finished(finished: &Receiver<String>, count: usize) -> Result<()> {
    for _ in 0..count {
        let name = finished
            .recv_timeout(SCENARIO_TIMEOUT)
            .context("agent did not finish in time")?;
        info!(agent = %name, "Agent finished");
    }
    Ok(())
}

fn run_scenario(
    registry: &DispatcherRegistry,
    dispatcher: Arc<SingleThreadDispatcher>,
    agents: Vec<AgentRef>,
) -> Result<()> {
    println!("=== {} ===", dispatcher.name());

    let (tx, rx) = unbounded();
    let count = agents.len();
    for agent in agents {
        DemoAgent::launch(registry, dispatcher.name(), agent, tx.clone())?;
    }

    dispatcher.start()?;
    wait_finished(&rx, count)?;
    registry.shutdown_all(true)?;

    let stats = dispatcher.stats();
    info!(
        dispatcher = %dispatcher.name(),
        executed = stats.executed,
        failed = stats.failed,
        skipped = stats.skipped,
        "Scenario complete"
    );
    if stats.failed > 0 {
        warn!(dispatcher = %dispatcher.name(), "{} handlers failed", stats.failed);
    }
    Ok(())
}

fn simple_fifo(base: &DispatcherConfig) -> Result<()> {
    let registry = DispatcherRegistry::new();
    let dispatcher = SingleThreadDispatcher::builder()
        .config(scenario_config(base, "simple_fifo"))
        .queue_policy(FifoQueue::new())
        .register(&registry)?;

    run_scenario(&registry, dispatcher, vec![AgentRef::new("Alice")])
}

fn hardcoded_priorities(base: &DispatcherConfig) -> Result<()> {
    let classifier = |demand: &Demand| match demand.kind() {
        DemandKind::Start => Priority::Highest,
        DemandKind::Finish => Priority::Lowest,
        _ if demand.is_message::<Bye>() => Priority::High,
        _ if demand.is_message::<Hello>() => Priority::Low,
        _ => Priority::Normal,
    };

    let registry = DispatcherRegistry::new();
    let dispatcher = SingleThreadDispatcher::builder()
        .config(scenario_config(base, "hardcoded_priorities"))
        .queue_policy(PriorityQueue::new(classifier))
        .register(&registry)?;

    run_scenario(&registry, dispatcher, vec![AgentRef::new("Alice")])
}

fn dynamic_per_agent_priorities(base: &DispatcherConfig) -> Result<()> {
    let priorities = AgentPriorities::new();
    let alice = AgentRef::new("Alice");
    let bob = AgentRef::new("Bob");

    priorities.define_priority::<Hello>(&alice, Priority::Low);
    priorities.define_priority::<Bye>(&alice, Priority::High);
    priorities.define_priority::<Hello>(&bob, Priority::High);
    priorities.define_priority::<Bye>(&bob, Priority::Low);

    let registry = DispatcherRegistry::new();
    let dispatcher = SingleThreadDispatcher::builder()
        .config(scenario_config(base, "dynamic_per_agent_priorities"))
        .queue_policy(priorities.queue())
        .register(&registry)?;

    run_scenario(&registry, dispatcher, vec![alice, bob])?;

    // Finish demands forget each agent's table
    info!("Priority tables left: {}", priorities.agent_count());
    Ok(())
}

fn separate_queues(base: &DispatcherConfig) -> Result<()> {
    let dispatcher = Arc::new(SingleThreadDispatcher::new(scenario_config(
        base,
        "separate_queues",
    ))?);
    let fifo = dispatcher.binder(FifoQueue::new());
    let ranked = dispatcher.binder(PriorityQueue::new(|demand: &Demand| {
        if demand.is_message::<Bye>() {
            Priority::High
        } else {
            Priority::Normal
        }
    }));

    println!("=== {} ===", dispatcher.name());

    let (tx, rx) = unbounded();
    let shared: Arc<dyn Dispatcher> = dispatcher.clone();
    for (binder, name) in [(&fifo, "Alice"), (&ranked, "Bob")] {
        let agent = AgentRef::new(name);
        let handle = binder.bind(&agent)?;
        DemoAgent::launch_with(handle, Arc::clone(&shared), agent, tx.clone())?;
    }

    dispatcher.start()?;
    wait_finished(&rx, 2)?;
    dispatcher.shutdown(true)?;

    let stats = dispatcher.queue_stats();
    info!(
        dispatcher = %dispatcher.name(),
        lanes = stats.lanes,
        pushed = stats.push_count,
        "Scenario complete"
    );
    Ok(())
}

fn main() -> Result<()> {
    // Initialize observability (tracing, metrics)
    init_tracing()?;
    let metrics = init_metrics()?;

    info!("Starting custom queue dispatch demo v{}", custom_queue_dispatch::VERSION);

    // Load configuration
    let config = DispatcherConfig::load()?;
    info!("Configuration loaded: {:?}", config);

    simple_fifo(&config)?;
    hardcoded_priorities(&config)?;
    dynamic_per_agent_priorities(&config)?;
    separate_queues(&config)?;

    println!("=== metrics ===");
    print!("{}", metrics.render());
    Ok(())
}
