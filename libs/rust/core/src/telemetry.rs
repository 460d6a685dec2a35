//! Coordinator metrics on the global OpenTelemetry meter.
//!
//! Without an installed meter provider these are no-ops, so libraries and
//! tests can record freely.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};

pub struct CoordinatorMetrics {
    pub iterations_created: Counter<u64>,
    pub iterations_finalized: Counter<u64>,
    pub assignments_created: Counter<u64>,
    pub assignment_conflicts: Counter<u64>,
    pub submissions_accepted: Counter<u64>,
    pub assign_latency_ms: Histogram<f64>,
}

static COORD_METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("fedround_coordinator"));

pub static COORDINATOR_METRICS: Lazy<CoordinatorMetrics> = Lazy::new(|| {
    CoordinatorMetrics {
        iterations_created: COORD_METER.u64_counter("fedround_iterations_created_total")
            .with_description("Iteration ledger records written")
            .build(),
        iterations_finalized: COORD_METER.u64_counter("fedround_iterations_finalized_total")
            .with_description("Version 0 records written (iteration finalized)")
            .build(),
        assignments_created: COORD_METER.u64_counter("fedround_assignments_created_total")
            .with_description("Client assignments created")
            .build(),
        assignment_conflicts: COORD_METER.u64_counter("fedround_assignment_conflicts_total")
            .with_description("Assignments rejected because the client is bound to a running iteration")
            .build(),
        submissions_accepted: COORD_METER.u64_counter("fedround_submissions_total")
            .with_description("Client model submissions appended")
            .build(),
        assign_latency_ms: COORD_METER.f64_histogram("fedround_assign_check_insert_ms")
            .with_description("Time spent holding the client lock for check-and-insert (ms)")
            .with_unit("ms")
            .build(),
    }
});
