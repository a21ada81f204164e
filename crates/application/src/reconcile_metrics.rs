/// Counts one failed operation inside a reconciliation pass.
pub(crate) fn record_reconciler_failure(reconciler: &'static str, operation: &'static str) {
    metrics::counter!(
        "grantkeeper_reconciler_failures_total",
        "reconciler" => reconciler,
        "operation" => operation
    )
    .increment(1);
}

/// Counts one external call that failed after the store already committed.
pub(crate) fn record_deferred_external_failure(operation: &'static str) {
    metrics::counter!(
        "grantkeeper_access_external_failures_total",
        "operation" => operation
    )
    .increment(1);
}

/// Counts one completed reconciliation cycle with its outcome.
pub(crate) fn record_cycle(reconciler: &'static str, outcome: &'static str) {
    metrics::counter!(
        "grantkeeper_reconciler_cycles_total",
        "reconciler" => reconciler,
        "outcome" => outcome
    )
    .increment(1);
}
