use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::application::events::Event;
use crate::models::IntegrationStatus;
use crate::state::AppContext;

/// Human-readable status sink: turns bus events into log lines.
pub async fn run_status_reporter(ctx: AppContext) {
    info!("Status reporter started");

    let mut event_rx = ctx.subscribe_events();

    loop {
        match event_rx.recv().await {
            Ok(event) => report(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Status reporter lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    info!("Status reporter stopped");
}

fn report(event: &Event) {
    match event {
        Event::BuildStatus { project, status, .. } => match status {
            IntegrationStatus::Building => info!("{}: integration started", project),
            IntegrationStatus::Success => info!("{}: integration succeeded", project),
            other => warn!("{}: integration finished with {}", project, other),
        },
        Event::Error { project, message, .. } => {
            warn!("{}: {}", project.as_deref().unwrap_or("server"), message)
        }
        Event::Log { project, line, .. } => debug!("{} | {}", project, line),
        Event::QueueEntered { project, queue, .. } => debug!("{}: entered queue {}", project, queue),
        Event::QueueExited {
            project,
            queue,
            cancelled,
            ..
        } => {
            if *cancelled {
                info!("{}: pending request cancelled on queue {}", project, queue);
            } else {
                debug!("{}: left queue {}", project, queue);
            }
        }
        Event::IntegratorState { project, state, .. } => info!("{}: integrator {}", project, state),
    }
}
