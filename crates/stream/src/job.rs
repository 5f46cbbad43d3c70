use tokio::runtime::{Builder, Handle, Runtime};

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Dispatches background jobs. Jobs report back through shared state; the
/// runner never hands results to the caller.
pub trait JobRunner: Send + Sync {
    fn run(&self, job: Job);
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineJobRunner;

impl JobRunner for InlineJobRunner {
    fn run(&self, job: Job) {
        job();
    }
}

enum RuntimeHandle {
    Owned(Runtime),
    Shared(Handle),
}

/// Runs jobs on tokio's blocking pool.
pub struct TokioJobRunner {
    runtime: RuntimeHandle,
}

impl TokioJobRunner {
    /// Start a dedicated runtime with a single worker thread.
    pub fn new() -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("sector-loader")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: RuntimeHandle::Owned(runtime),
        })
    }

    /// Use an existing runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            runtime: RuntimeHandle::Shared(handle),
        }
    }

    fn handle(&self) -> &Handle {
        match &self.runtime {
            RuntimeHandle::Owned(runtime) => runtime.handle(),
            RuntimeHandle::Shared(handle) => handle,
        }
    }
}

impl JobRunner for TokioJobRunner {
    fn run(&self, job: Job) {
        // detached; the job signals completion itself
        drop(self.handle().spawn_blocking(job));
    }
}
