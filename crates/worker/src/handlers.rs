use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jobflow::{boxed, Propagation, WorkerEvents};
use serde::Deserialize;

#[derive(Deserialize)]
struct EmailSendPayload {
    user_id: i64,
    template: Option<String>,
}

/// Handlers this binary knows about. Replace these with your real handlers.
pub fn build_events(shutdown: Arc<AtomicBool>) -> WorkerEvents {
    let mut events = WorkerEvents::new();

    events.on_job("demo_ok", |ev| {
        boxed(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            ev.job.set_handled();
            Ok(Propagation::Continue)
        })
    });

    // always asks for a retry; ends up escalated after max_fails
    events.on_job("fail_me", |ev| {
        boxed(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            ev.worker.log(format!(
                "fail_me attempt, fail_count={}",
                ev.record().fail_count
            ));
            ev.job.set_handled();
            ev.job.set_released();
            Ok(Propagation::Continue)
        })
    });

    events.on_job("email_send", |ev| {
        boxed(async move {
            match ev.job.data_as::<EmailSendPayload>() {
                Ok(payload) => {
                    ev.worker.log(format!(
                        "sending {} to user {}",
                        payload.template.as_deref().unwrap_or("default"),
                        payload.user_id
                    ));
                    ev.job.set_handled();
                }
                Err(err) => {
                    // a bad payload will not get better; let escalation drop it
                    tracing::warn!(job_id = ev.record().id, error = %err, "bad email_send payload");
                    ev.job.set_handled();
                    ev.job.set_released();
                }
            }
            Ok(Propagation::Continue)
        })
    });

    events.on_job("*", |ev| {
        boxed(async move {
            tracing::debug!(
                job_id = ev.record().id,
                job_name = %ev.record().job_name,
                handled = ev.job.is_handled(),
                "job dispatched"
            );
            Ok(Propagation::Continue)
        })
    });

    events.on_loop(move |_ev| {
        let stop = shutdown.load(Ordering::SeqCst);
        boxed(async move { Ok(Propagation::from(stop)) })
    });

    events
}
