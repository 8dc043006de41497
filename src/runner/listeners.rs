//! Job listener invocation around the work of a run.

use tracing::{debug, warn};

use super::report_failure;
use crate::artifact::ListenerHandle;
use crate::context::JobContext;
use crate::error::{BatchError, Result, catch_panic};
use crate::report::FailureSink;
use crate::state_machine::BatchStatus;

/// The listener handles of one run, in declaration order.
pub(crate) struct JobListeners {
    handles: Vec<ListenerHandle>,
}

impl JobListeners {
    /// Constructs a handle for every listener reference of the job.
    ///
    /// Construction is all or nothing: when one listener cannot be built,
    /// the ones already built are destroyed without any hook being called.
    pub(crate) fn create(ctx: &JobContext) -> Result<Self> {
        let factory = ctx.artifacts();
        let refs = &ctx.job().listeners;
        let mut handles = Vec::with_capacity(refs.len());

        for listener in refs {
            let created = catch_panic(|| factory.create(&listener.reference, &listener.properties))
                .map_err(|source| BatchError::Setup {
                    component: listener.reference.clone(),
                    source,
                })
                .and_then(|created| created);

            match created {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    destroy_handles(ctx, handles);
                    return Err(err);
                }
            }
        }
        Ok(Self { handles })
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Calls every before-hook in order, stopping at the first failure.
    pub(crate) fn before_job(&mut self, ctx: &JobContext) -> Result<()> {
        for handle in &mut self.handles {
            debug!(job = %ctx.job().id, listener = handle.reference(), "beforeJob");
            catch_panic(|| handle.before_job(ctx))
                .and_then(|result| result)
                .map_err(|source| BatchError::Setup {
                    component: handle.reference().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Calls every after-hook in order. A failing hook is reported and fails
    /// the execution; the remaining hooks still run.
    pub(crate) fn after_job(&mut self, ctx: &JobContext, sink: &dyn FailureSink) {
        for handle in &mut self.handles {
            debug!(job = %ctx.job().id, listener = handle.reference(), "afterJob");
            let outcome = catch_panic(|| handle.after_job(ctx)).and_then(|result| result);
            if let Err(source) = outcome {
                let err = BatchError::Teardown {
                    component: handle.reference().to_string(),
                    source,
                };
                report_failure(sink, &ctx.job().id, "afterJob", handle.reference(), &err);
                ctx.execution().set_batch_status(BatchStatus::Failed);
            }
        }
    }

    /// Hands every handle back to the factory.
    pub(crate) fn destroy(self, ctx: &JobContext) {
        destroy_handles(ctx, self.handles);
    }
}

/// A factory panicking while destroying handles is logged and otherwise ignored.
fn destroy_handles(ctx: &JobContext, handles: Vec<ListenerHandle>) {
    if let Err(err) = catch_panic(|| ctx.artifacts().destroy(handles)) {
        warn!(job = %ctx.job().id, error = %err, "destroying job listeners panicked");
    }
}
