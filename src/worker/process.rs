use super::context::WorkerContext;
use super::types::{StepDelay, StepFn};
use crate::runtime::config::ExecutionMode;
use crate::runtime::fault::{panic_message, StepFault, StepPhase};
use crate::runtime::scheduler::{LocalScheduler, WakeEvent};
use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Where the step loop parks between invocations.
enum Parker {
    Thread,
    Scheduler(WakeEvent),
}

impl Parker {
    async fn park(&mut self, ctx: &WorkerContext, limit: Option<Duration>) {
        let shared = ctx.shared();
        match self {
            Parker::Thread => shared.mailbox.wait_blocking(&shared.run, limit),
            Parker::Scheduler(event) => {
                shared
                    .mailbox
                    .wait_cooperative(&shared.run, event, limit)
                    .await
            }
        }
    }
}

/// Body of the worker thread. Never unwinds past this frame.
pub(super) fn thread_main(ctx: WorkerContext, step: Box<dyn StepFn>, event: Option<WakeEvent>) {
    let _log_guard = ctx
        .config()
        .log_dispatch()
        .map(tracing::dispatcher::set_default);
    let span = tracing::info_span!("worker", worker = %ctx.name());
    let _entered = span.enter();

    tracing::info!(mode = ?ctx.config().mode(), "worker thread started");

    match (ctx.config().mode(), event) {
        (ExecutionMode::Cooperative, Some(event)) => run_cooperative(&ctx, step, event),
        _ => futures::executor::block_on(run_steps(&ctx, step, Parker::Thread)),
    }

    ctx.shared().mailbox.detach_wake();
    tracing::info!(loops = ctx.loop_count(), "worker thread exited");
}

fn run_cooperative(ctx: &WorkerContext, step: Box<dyn StepFn>, event: WakeEvent) {
    match LocalScheduler::new() {
        Ok(scheduler) => {
            scheduler.block_on(run_steps(ctx, step, Parker::Scheduler(event)));
            scheduler.shutdown(ctx.config().shutdown_timeout());
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                "worker scheduler unavailable; driving step function on the thread"
            );
            futures::executor::block_on(run_steps(ctx, step, Parker::Thread));
        }
    }
}

async fn run_steps(ctx: &WorkerContext, mut step: Box<dyn StepFn>, mut parker: Parker) {
    let shared = ctx.shared();

    while ctx.want_run() {
        let delay = match invoke(step.as_mut(), ctx).await {
            Ok(delay) => delay,
            Err(error) => {
                shared
                    .faults
                    .record(ctx.name(), StepFault::new(StepPhase::Run, error));
                shared.telemetry.record_step_fault();
                shared.run.store(false, Ordering::SeqCst);
                break;
            }
        };

        match delay {
            StepDelay::Exit => {
                tracing::debug!("step function requested exit");
                shared.run.store(false, Ordering::SeqCst);
                break;
            }
            StepDelay::Immediate => {
                shared.loop_count.fetch_add(1, Ordering::SeqCst);
            }
            StepDelay::After(delay) => {
                shared.loop_count.fetch_add(1, Ordering::SeqCst);
                parker.park(ctx, Some(delay)).await;
            }
            StepDelay::Idle => {
                shared.loop_count.fetch_add(1, Ordering::SeqCst);
                parker.park(ctx, ctx.config().max_idle_wait()).await;
            }
        }
    }

    tracing::debug!(loops = ctx.loop_count(), "running teardown step");
    let outcome = invoke(step.as_mut(), ctx).await;
    shared.loop_count.fetch_add(1, Ordering::SeqCst);
    if let Err(error) = outcome {
        shared
            .faults
            .record(ctx.name(), StepFault::new(StepPhase::Teardown, error));
        shared.telemetry.record_teardown_fault();
    }
}

/// Runs one step invocation, turning panics into errors.
async fn invoke(step: &mut dyn StepFn, ctx: &WorkerContext) -> Result<StepDelay> {
    let start = AssertUnwindSafe(move || {
        let step = step;
        step.step(ctx.clone())
    });
    let future = match panic::catch_unwind(start) {
        Ok(future) => future,
        Err(payload) => return Err(panicked(payload.as_ref())),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panicked(payload.as_ref())),
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> anyhow::Error {
    anyhow!("step function panicked: {}", panic_message(payload))
}
