use super::*;
use crate::runtime::config::{ExecutionMode, WorkerConfig, WorkerConfigBuilder};
use crate::runtime::scheduler::in_scheduler_context;
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::MakeWriter;

fn config(name: &str) -> WorkerConfigBuilder {
    WorkerConfig::builder().name(name)
}

fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn step_delay_from_seconds() {
    assert_eq!(StepDelay::from_secs_f64(-1.0), StepDelay::Exit);
    assert_eq!(StepDelay::from_secs_f64(0.0), StepDelay::Immediate);
    assert_eq!(
        StepDelay::from_secs_f64(0.5),
        StepDelay::After(Duration::from_millis(500))
    );
    assert_eq!(StepDelay::from_secs_f64(f64::INFINITY), StepDelay::Idle);
    assert_eq!(StepDelay::from(None), StepDelay::Idle);
    assert_eq!(StepDelay::from(Some(Duration::ZERO)), StepDelay::Immediate);
}

#[test]
fn exit_runs_exactly_one_teardown_call() -> Result<()> {
    let calls = Arc::new(AtomicU64::new(0));
    let teardown_saw_run = Arc::new(AtomicBool::new(true));
    let (counter, saw_run) = (calls.clone(), teardown_saw_run.clone());

    let worker = Worker::new(config("exit").build()?, move |ctx: WorkerContext| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        saw_run.store(ctx.want_run(), Ordering::SeqCst);
        async move {
            anyhow::Ok(if call >= 3 {
                StepDelay::Exit
            } else {
                StepDelay::Immediate
            })
        }
    })?;
    worker.join(false);

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(!teardown_saw_run.load(Ordering::SeqCst));
    assert_eq!(worker.loop_count(), 3);
    assert!(!worker.want_run());
    assert!(worker.fault().is_none());
    assert!(worker.is_finished());
    Ok(())
}

#[test]
fn step_error_is_recorded_and_teardown_still_runs() -> Result<()> {
    let teardowns = Arc::new(AtomicU64::new(0));
    let seen = teardowns.clone();

    let worker = Worker::new(config("fails").build()?, move |ctx: WorkerContext| {
        let normal = ctx.want_run();
        if !normal {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        async move {
            if normal {
                Err(anyhow!("boom"))
            } else {
                Ok(StepDelay::Exit)
            }
        }
    })?;
    worker.join(false);

    let fault = worker.fault().expect("fault recorded");
    assert!(fault.to_string().contains("boom"));
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(worker.loop_count(), 1);
    assert_eq!(worker.context().telemetry().step_faults, 1);
    Ok(())
}

#[test]
fn panics_are_faults_not_crashes() -> Result<()> {
    let worker = Worker::new(config("panics").build()?, |ctx: WorkerContext| {
        if ctx.want_run() {
            panic!("sync kaboom");
        }
        async { anyhow::Ok(StepDelay::Exit) }
    })?;
    worker.join(false);
    assert!(worker.fault().unwrap().to_string().contains("sync kaboom"));

    let worker = Worker::new(config("panics-async").build()?, |ctx: WorkerContext| async move {
        if ctx.want_run() {
            panic!("async kaboom");
        }
        anyhow::Ok(StepDelay::Exit)
    })?;
    worker.join(false);
    assert!(worker.fault().unwrap().to_string().contains("async kaboom"));
    assert_eq!(worker.loop_count(), 1);
    Ok(())
}

#[test]
fn teardown_faults_are_swallowed() -> Result<()> {
    let worker = Worker::new(config("teardown").build()?, |ctx: WorkerContext| async move {
        if ctx.want_run() {
            Ok(StepDelay::Exit)
        } else {
            Err(anyhow!("teardown boom"))
        }
    })?;
    worker.join(false);

    assert!(worker.fault().is_none());
    let telemetry = worker.context().telemetry();
    assert_eq!(telemetry.teardown_faults, 1);
    assert_eq!(telemetry.step_faults, 0);
    assert_eq!(worker.loop_count(), 1);
    Ok(())
}

fn collecting_worker(name: &str, mode: ExecutionMode, seen: Arc<Mutex<Vec<Value>>>) -> Result<Worker> {
    let config = config(name).mode(mode).build()?;
    Worker::new(config, move |ctx: WorkerContext| {
        while let Some(payload) = ctx.get_msg_data() {
            seen.lock().unwrap().push(payload);
        }
        async { anyhow::Ok(StepDelay::Idle) }
    })
}

#[test]
fn idle_workers_wake_for_each_message() -> Result<()> {
    for mode in [ExecutionMode::Cooperative, ExecutionMode::Blocking] {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = collecting_worker("collector", mode, seen.clone())?;

        for n in 0..3 {
            worker.add_msg(json!(n));
            thread::sleep(Duration::from_millis(5));
        }
        assert!(
            wait_until(Duration::from_secs(5), || seen.lock().unwrap().len() == 3),
            "{mode:?}: messages not consumed"
        );
        worker.join(true);

        assert_eq!(*seen.lock().unwrap(), vec![json!(0), json!(1), json!(2)]);
        assert_eq!(worker.msg_count(), 3);
        assert_eq!(worker.pending(), 0);
    }
    Ok(())
}

#[test]
fn step_can_post_to_its_own_mailbox() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let worker = Worker::new(config("self-post").build()?, move |ctx: WorkerContext| {
        if ctx.msg_count() == 0 {
            ctx.add_msg("from myself");
        }
        while let Some(payload) = ctx.get_msg_data() {
            sink.lock().unwrap().push(payload);
        }
        async { anyhow::Ok(StepDelay::Idle) }
    })?;

    assert!(wait_until(Duration::from_secs(5), || !seen
        .lock()
        .unwrap()
        .is_empty()));
    worker.join(true);
    assert_eq!(*seen.lock().unwrap(), vec![json!("from myself")]);
    Ok(())
}

#[test]
fn start_is_valid_once() -> Result<()> {
    let worker = Worker::new(config("once").build()?, |_ctx: WorkerContext| async {
        anyhow::Ok(StepDelay::Idle)
    })?;
    assert!(worker.is_started());
    let err = worker.start().unwrap_err();
    assert!(matches!(err, WorkerError::AlreadyStarted { ref name } if name == "once"));
    Ok(())
}

#[test]
fn join_is_idempotent_and_tolerates_unstarted_workers() -> Result<()> {
    let calls = Arc::new(AtomicU64::new(0));
    let counter = calls.clone();
    let idle = Worker::new(
        config("never").auto_start(false).build()?,
        move |_ctx: WorkerContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { anyhow::Ok(StepDelay::Exit) }
        },
    )?;
    idle.join(true);
    idle.join(false);
    assert!(!idle.is_started());
    assert!(!idle.is_finished());
    drop(idle);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let worker = Worker::spawn(|_ctx: WorkerContext| async { anyhow::Ok(StepDelay::Idle) })?;
    assert!(wait_until(Duration::from_secs(5), || worker.loop_count() >= 1));
    worker.join(true);
    worker.join(true);
    worker.join(false);
    assert!(worker.is_finished());
    assert_eq!(worker.loop_count(), 2);
    Ok(())
}

#[test]
fn stop_interrupts_long_delays() -> Result<()> {
    for mode in [ExecutionMode::Cooperative, ExecutionMode::Blocking] {
        let worker = Worker::new(
            config("sleeper").mode(mode).build()?,
            |_ctx: WorkerContext| async { anyhow::Ok(StepDelay::After(Duration::from_secs(60))) },
        )?;
        assert!(wait_until(Duration::from_secs(5), || worker.loop_count() >= 1));

        let started = Instant::now();
        worker.join(true);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "{mode:?}: join took {:?}",
            started.elapsed()
        );
        assert_eq!(worker.loop_count(), 2);
    }
    Ok(())
}

#[test]
fn status_is_readable_while_a_join_is_in_progress() -> Result<()> {
    let tearing_down = Arc::new(AtomicBool::new(false));
    let flag = tearing_down.clone();
    let worker = Worker::spawn(move |ctx: WorkerContext| {
        if !ctx.want_run() {
            flag.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(400));
        }
        async { anyhow::Ok(StepDelay::Idle) }
    })?;
    assert!(wait_until(Duration::from_secs(5), || worker.loop_count() >= 1));

    thread::scope(|scope| {
        let joiner = scope.spawn(|| worker.join(true));
        assert!(wait_until(Duration::from_secs(5), || tearing_down
            .load(Ordering::SeqCst)));
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        assert!(worker.is_started());
        assert!(!worker.is_finished());
        assert!(
            start.elapsed() < Duration::from_millis(200),
            "status blocked behind the joiner for {:?}",
            start.elapsed()
        );

        worker.join(false);
        assert!(worker.is_finished(), "a second joiner waits for the thread");
        joiner.join().expect("joiner thread");
    });
    assert!(worker.fault().is_none());
    Ok(())
}

#[test]
fn timed_delays_pace_the_loop() -> Result<()> {
    let worker = Worker::new(config("pacer").build()?, |_ctx: WorkerContext| async {
        anyhow::Ok(StepDelay::After(Duration::from_millis(50)))
    })?;
    thread::sleep(Duration::from_millis(500));
    worker.join(true);

    let loops = worker.loop_count();
    assert!((3..=15).contains(&loops), "unexpected loop count {loops}");
    Ok(())
}

#[test]
fn mailbox_is_fifo_before_start() -> Result<()> {
    let worker = Worker::new(
        config("fifo").auto_start(false).build()?,
        |_ctx: WorkerContext| async { anyhow::Ok(StepDelay::Exit) },
    )?;
    for n in 1..=5 {
        worker.add_msg(n);
    }
    assert_eq!(worker.msg_count(), 5);
    assert_eq!(worker.pending(), 5);

    let ctx = worker.context();
    let drained: Vec<_> = std::iter::from_fn(|| ctx.get_msg_data()).collect();
    assert_eq!(drained, (1..=5).map(|n| json!(n)).collect::<Vec<_>>());
    assert!(ctx.get_msg().is_none());
    assert_eq!(worker.msg_count(), 5);
    Ok(())
}

#[test]
fn with_args_passes_a_clone_each_call() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let step = with_args(
        (String::from("hello"), seen.clone()),
        |ctx: WorkerContext, (greeting, seen): (String, Arc<Mutex<Vec<String>>>)| async move {
            seen.lock().unwrap().push(greeting);
            anyhow::Ok(if ctx.want_run() {
                StepDelay::Exit
            } else {
                StepDelay::Idle
            })
        },
    );
    let worker = Worker::new(config("args").build()?, step)?;
    worker.join(false);
    assert_eq!(*seen.lock().unwrap(), vec!["hello", "hello"]);
    Ok(())
}

#[test]
fn cooperative_steps_can_spawn_local_tasks() -> Result<()> {
    let ran = Arc::new(AtomicBool::new(false));
    let in_scheduler = Arc::new(AtomicBool::new(false));
    let (flag, scheduler_flag) = (ran.clone(), in_scheduler.clone());

    let worker = Worker::new(config("local").build()?, move |ctx: WorkerContext| {
        let flag = flag.clone();
        scheduler_flag.store(in_scheduler_context(), Ordering::SeqCst);
        async move {
            if !ctx.want_run() {
                return anyhow::Ok(StepDelay::Exit);
            }
            if flag.load(Ordering::SeqCst) {
                return anyhow::Ok(StepDelay::Exit);
            }
            let task_flag = flag.clone();
            tokio::task::spawn_local(async move {
                task_flag.store(true, Ordering::SeqCst);
            });
            anyhow::Ok(StepDelay::After(Duration::from_millis(20)))
        }
    })?;
    worker.join(false);

    assert!(ran.load(Ordering::SeqCst));
    assert!(in_scheduler.load(Ordering::SeqCst));
    assert!(worker.fault().is_none());
    Ok(())
}

#[test]
fn blocking_steps_run_outside_any_scheduler() -> Result<()> {
    let in_scheduler = Arc::new(AtomicBool::new(true));
    let flag = in_scheduler.clone();
    let worker = Worker::new(
        config("blocking").mode(ExecutionMode::Blocking).build()?,
        move |_ctx: WorkerContext| {
            flag.store(in_scheduler_context(), Ordering::SeqCst);
            async { anyhow::Ok(StepDelay::Exit) }
        },
    )?;
    worker.join(false);
    assert!(!in_scheduler.load(Ordering::SeqCst));
    Ok(())
}

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLog {
    type Writer = CapturedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn injected_dispatch_receives_worker_logs() -> Result<()> {
    let log = CapturedLog::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(log.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    let config = config("logged")
        .log_dispatch(tracing::Dispatch::new(subscriber))
        .build()?;
    let worker = Worker::new(config, |_ctx: WorkerContext| async {
        tracing::info!("hello from the step");
        anyhow::Ok(StepDelay::Exit)
    })?;
    worker.join(false);

    let contents = log.contents();
    assert!(contents.contains("worker thread started"), "{contents}");
    assert!(contents.contains("hello from the step"), "{contents}");
    assert!(contents.contains("logged"), "{contents}");
    Ok(())
}
