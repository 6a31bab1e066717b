//! Convergence loop behaviour under a simulated clock and scripted pushes.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use steward_agent::{ClusterStatus, ConvergenceLoop, ConvergenceRuntime, LoopPhase, LoopTiming};
use steward_core::effects::EmptyRegistry;
use steward_core::{ClusterStateChange, Deployment, DeploymentState, Node, StateChange};
use steward_testkit::{
    application_using, hostname, node_id, node_state_with_applications, primary_manifestation,
    RecordingControlChannel, RecordingExecutor, ScriptedDeployer, SimulatedTimeHandler,
};

const POLL: Duration = Duration::from_secs(5);

struct Harness {
    deployer: Arc<ScriptedDeployer>,
    control: Arc<RecordingControlChannel>,
    executor: Arc<RecordingExecutor<String>>,
    time: Arc<SimulatedTimeHandler>,
    pushes: watch::Sender<Option<ClusterStatus>>,
    shutdown: watch::Sender<bool>,
    phases: watch::Receiver<LoopPhase>,
    task: JoinHandle<()>,
}

impl Harness {
    fn start(deployer: ScriptedDeployer) -> Self {
        let deployer = Arc::new(deployer);
        let control = Arc::new(RecordingControlChannel::new());
        let executor = Arc::new(RecordingExecutor::new());
        let time = Arc::new(SimulatedTimeHandler::new(1_000));
        let (pushes, statuses) = watch::channel(None);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let convergence_loop = ConvergenceLoop::new(
            deployer.clone(),
            control.clone(),
            executor.clone(),
            time.clone(),
            Arc::new(EmptyRegistry),
        )
        .with_timing(LoopTiming::for_testing());
        let phases = convergence_loop.phases();
        let task = tokio::spawn(convergence_loop.run(statuses, shutdown_rx));

        Self {
            deployer,
            control,
            executor,
            time,
            pushes,
            shutdown,
            phases,
            task,
        }
    }

    fn push(&self, status: ClusterStatus) {
        self.pushes.send_replace(Some(status));
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(*self.phases.borrow(), LoopPhase::Stopped);
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn scripted() -> ScriptedDeployer {
    ScriptedDeployer::new(node_id(1), hostname(1), POLL)
}

fn configured_status() -> ClusterStatus {
    let configuration = Deployment::default().with_node(node_id(1), Node::new(node_id(1)));
    ClusterStatus::new(configuration, DeploymentState::default())
}

fn busy_when_configured() -> ScriptedDeployer {
    scripted().with_policy(|configuration, _, _| {
        if configuration.nodes.is_empty() {
            StateChange::NoOp
        } else {
            StateChange::Action("converge".to_string())
        }
    })
}

#[tokio::test]
async fn nothing_happens_before_the_first_push() {
    let harness = Harness::start(scripted());
    settle().await;

    assert_eq!(harness.deployer.discovery_count(), 0);
    assert_eq!(*harness.phases.borrow(), LoopPhase::Idle);
    harness.stop().await;
}

#[tokio::test]
async fn noop_suppresses_discovery_until_poll_interval() {
    let harness = Harness::start(scripted());
    harness.push(ClusterStatus::default());
    harness.deployer.wait_for_discoveries(1).await;
    harness.time.wait_for_sleepers(1).await;
    assert_eq!(*harness.phases.borrow(), LoopPhase::Sleeping);

    // A push that still calculates to NoOp is evaluated but does not wake the loop.
    harness.push(ClusterStatus::default());
    harness.deployer.wait_for_calculations(2).await;
    settle().await;
    assert_eq!(harness.deployer.discovery_count(), 1);

    harness.time.advance(POLL - Duration::from_millis(1));
    settle().await;
    assert_eq!(harness.deployer.discovery_count(), 1);

    harness.time.advance(Duration::from_millis(1));
    harness.deployer.wait_for_discoveries(2).await;
    assert!(harness.executor.executed().is_empty());
    harness.stop().await;
}

#[tokio::test]
async fn push_that_produces_work_wakes_the_loop() {
    let harness = Harness::start(busy_when_configured());
    harness.push(ClusterStatus::default());
    harness.time.wait_for_sleepers(1).await;
    assert_eq!(harness.deployer.discovery_count(), 1);

    harness.push(configured_status());
    harness.deployer.wait_for_discoveries(2).await;
    harness.executor.wait_for_executions(1).await;

    assert_eq!(harness.executor.executed(), vec!["converge".to_string()]);
    assert_eq!(harness.time.current_ms(), 1_000);
    harness.stop().await;
}

#[tokio::test]
async fn successful_change_rediscovers_after_short_delay() {
    let harness = Harness::start(busy_when_configured());
    harness.push(configured_status());
    harness.executor.wait_for_executions(1).await;
    harness.time.wait_for_sleepers(1).await;

    harness.time.advance(LoopTiming::for_testing().unconverged_delay);
    harness.deployer.wait_for_discoveries(2).await;
    harness.executor.wait_for_executions(2).await;
    harness.stop().await;
}

#[tokio::test]
async fn failed_changes_back_off_with_doubling_delay() {
    let harness = Harness::start(busy_when_configured());
    harness.executor.set_failure(Some("disk full"));
    harness.push(configured_status());
    harness.executor.wait_for_executions(1).await;
    harness.time.wait_for_sleepers(1).await;

    harness.time.advance(Duration::from_millis(49));
    settle().await;
    assert_eq!(harness.deployer.discovery_count(), 1);
    harness.time.advance(Duration::from_millis(1));
    harness.executor.wait_for_executions(2).await;
    harness.time.wait_for_sleepers(1).await;

    harness.time.advance(Duration::from_millis(99));
    settle().await;
    assert_eq!(harness.deployer.discovery_count(), 2);
    harness.time.advance(Duration::from_millis(1));
    harness.deployer.wait_for_discoveries(3).await;
    harness.stop().await;
}

#[tokio::test]
async fn discovery_failure_keeps_seed_and_waits_poll_interval() {
    let known = node_state_with_applications(1, vec![application_using("db", Some(3))]);
    let state = DeploymentState::default().apply_changes(&[ClusterStateChange::Node(known.clone())]);

    let harness = Harness::start(scripted());
    harness.deployer.fail_next_discovery("volume manager timed out");
    harness.push(ClusterStatus::new(Deployment::default(), state));
    harness.deployer.wait_for_discoveries(1).await;
    harness.time.wait_for_sleepers(1).await;
    assert_eq!(harness.control.attempt_count(), 0);
    assert_eq!(harness.deployer.calculation_count(), 0);

    harness.time.advance(POLL);
    harness.deployer.wait_for_discoveries(2).await;
    harness.control.wait_for_attempts(1).await;

    assert_eq!(harness.deployer.seeds(), vec![known.clone(), known]);
    harness.stop().await;
}

#[tokio::test]
async fn unchanged_shared_state_is_sent_once() {
    let harness = Harness::start(scripted());
    harness.push(ClusterStatus::default());
    harness.time.wait_for_sleepers(1).await;

    harness.time.advance(POLL);
    harness.deployer.wait_for_discoveries(2).await;
    harness.time.wait_for_sleepers(1).await;
    assert_eq!(harness.control.attempt_count(), 1);

    let mut changed = steward_core::NodeState::new(node_id(1), hostname(1));
    let manifestation = primary_manifestation(4);
    changed.manifestations = Some([(manifestation.dataset_id(), manifestation)].into_iter().collect());
    harness.deployer.push_discovery(Ok(changed.clone()));

    harness.time.advance(POLL);
    harness.control.wait_for_attempts(2).await;
    assert_eq!(harness.control.sent().last(), Some(&vec![ClusterStateChange::Node(changed)]));
    harness.stop().await;
}

#[tokio::test]
async fn failed_send_is_retried_next_cycle() {
    let harness = Harness::start(scripted());
    harness.control.set_failing(true);
    harness.push(ClusterStatus::default());
    harness.control.wait_for_attempts(1).await;
    harness.time.wait_for_sleepers(1).await;
    assert_eq!(harness.control.send_count(), 0);

    harness.control.set_failing(false);
    harness.time.advance(POLL);
    harness.control.wait_for_attempts(2).await;
    assert_eq!(harness.control.send_count(), 1);
    harness.stop().await;
}

#[tokio::test]
async fn latest_push_seeds_the_next_discovery() {
    let harness = Harness::start(scripted());
    harness.deployer.block_discoveries(true);
    harness.push(ClusterStatus::default());
    harness.deployer.wait_for_discoveries(1).await;

    for n in [2, 3] {
        let mut record = steward_core::NodeState::new(node_id(1), format!("host-{n}"));
        record.applications = Some(Default::default());
        let state = DeploymentState::default().apply_changes(&[ClusterStateChange::Node(record)]);
        harness.push(ClusterStatus::new(Deployment::default(), state));
    }
    harness.deployer.block_discoveries(false);
    harness.time.wait_for_sleepers(1).await;
    // Only the newest of the queued pushes is evaluated.
    harness.deployer.wait_for_calculations(2).await;

    harness.time.advance(POLL);
    harness.deployer.wait_for_discoveries(2).await;
    let seeds = harness.deployer.seeds();
    assert_eq!(seeds[0].hostname, hostname(1));
    assert_eq!(seeds[1].hostname, "host-3");
    harness.stop().await;
}

#[tokio::test]
async fn shutdown_abandons_discovery_in_flight() {
    let harness = Harness::start(scripted());
    harness.deployer.block_discoveries(true);
    harness.push(ClusterStatus::default());
    harness.deployer.wait_for_discoveries(1).await;
    assert_eq!(*harness.phases.borrow(), LoopPhase::Discovering);

    harness.stop().await;
}

#[tokio::test]
async fn closed_push_channel_stops_the_loop() {
    let harness = Harness::start(scripted());
    harness.push(ClusterStatus::default());
    harness.time.wait_for_sleepers(1).await;

    let Harness {
        pushes, task, phases, ..
    } = harness;
    drop(pushes);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(*phases.borrow(), LoopPhase::Stopped);
}

#[tokio::test]
async fn runtime_drives_independent_loops() {
    let time = Arc::new(SimulatedTimeHandler::default());
    let runtime = ConvergenceRuntime::new();
    let deployers: Vec<_> = (1..=2)
        .map(|n| Arc::new(ScriptedDeployer::new(node_id(n), hostname(n), POLL)))
        .collect();
    let control = Arc::new(RecordingControlChannel::new());

    for deployer in &deployers {
        runtime.spawn_loop(ConvergenceLoop::new(
            deployer.clone(),
            control.clone(),
            Arc::new(RecordingExecutor::<String>::new()),
            time.clone(),
            Arc::new(EmptyRegistry),
        ));
    }
    assert_eq!(runtime.loop_count(), 2);

    assert_eq!(runtime.publish(ClusterStatus::default()), 2);
    for deployer in &deployers {
        deployer.wait_for_discoveries(1).await;
    }
    control.wait_for_attempts(2).await;
    time.wait_for_sleepers(2).await;

    tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
        .await
        .expect("runtime did not stop");
    assert_eq!(runtime.loop_count(), 0);
}

#[tokio::test]
async fn blocked_loop_does_not_hold_back_pushes_to_others() {
    let time = Arc::new(SimulatedTimeHandler::default());
    let runtime = ConvergenceRuntime::new();
    let slow = Arc::new(ScriptedDeployer::new(node_id(1), hostname(1), POLL));
    let fast = Arc::new(ScriptedDeployer::new(node_id(2), hostname(2), POLL));
    slow.block_discoveries(true);

    for deployer in [&slow, &fast] {
        runtime.spawn_loop(ConvergenceLoop::new(
            deployer.clone(),
            Arc::new(RecordingControlChannel::new()),
            Arc::new(RecordingExecutor::<String>::new()),
            time.clone(),
            Arc::new(EmptyRegistry),
        ));
    }

    assert_eq!(runtime.publish(ClusterStatus::default()), 2);
    slow.wait_for_discoveries(1).await;
    fast.wait_for_calculations(1).await;

    for pushed in 2..=40 {
        assert_eq!(runtime.publish(ClusterStatus::default()), 2);
        tokio::time::timeout(Duration::from_secs(5), fast.wait_for_calculations(pushed))
            .await
            .expect("push never reached the idle loop");
    }
    assert_eq!(slow.discovery_count(), 1);
    assert_eq!(slow.calculation_count(), 0);

    tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
        .await
        .expect("runtime did not stop");
}
