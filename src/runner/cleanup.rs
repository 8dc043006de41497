use tracing::{debug, warn};

use crate::context::JobContext;
use crate::error::catch_panic;

/// End-of-run teardown. Runs once per run, whatever path the run took.
pub(crate) fn clean_up(ctx: &JobContext) {
    // Dropping user data runs foreign `Drop` code.
    if let Err(err) = catch_panic(|| ctx.clear_transient_user_data()) {
        warn!(job = %ctx.job().id, error = %err, "dropping transient user data panicked");
    }
    let destroyed = ctx.destroy_scoped_instances();
    ctx.execution().clean_up();
    debug!(
        job = %ctx.job().id,
        execution = %ctx.execution().id(),
        scoped_instances = destroyed,
        "cleaned up job execution"
    );
}
