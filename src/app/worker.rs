use crate::app::{AppEvent, FetchRequest, FetchSource};
use crate::infra::{Mutation, TaskService, apply_mutation, fetch_range_all, refresh};
use std::sync::mpsc::Sender;

/// Runs one fetch and wraps the result for the event loop.
pub fn run_fetch(service: &dyn TaskService, seq: u64, request: FetchRequest) -> AppEvent {
    let source = request.source();
    let result = match request {
        FetchRequest::Refresh { include_completed } => refresh(service, include_completed),
        FetchRequest::Range(range) => fetch_range_all(service, range.start, range.end),
    };
    if let Err(error) = &result {
        log::warn!("fetch {seq} failed: {error}");
    }
    AppEvent::Loaded {
        seq,
        source,
        result,
    }
}

/// Posts `Mutated`, then the `Loaded` of a full refresh tagged with `seq`.
/// The refresh runs whether or not the mutation succeeded.
pub fn run_mutation(service: &dyn TaskService, seq: u64, mutation: Mutation, tx: &Sender<AppEvent>) {
    let label = mutation.label();
    let result = apply_mutation(service, &mutation);
    match &result {
        Ok(()) => log::info!("{label}"),
        Err(error) => log::warn!("mutation failed ({label}): {error}"),
    }
    let _ = tx.send(AppEvent::Mutated { label, result });

    let result = refresh(service, true);
    if let Err(error) = &result {
        log::warn!("refresh {seq} failed: {error}");
    }
    let _ = tx.send(AppEvent::Loaded {
        seq,
        source: FetchSource::Refresh,
        result,
    });
}
