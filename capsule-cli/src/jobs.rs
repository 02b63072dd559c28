//! Job execution
//!
//! Builds the capsule for each job and pushes the job's data through the
//! host harness. Input series of one job run in parallel on rayon's pool
//! against the same capsule.

use crate::callbacks::{load_external, ExternalKernel};
use crate::config::JobConfig;
use anyhow::{anyhow, Context, Result};
use capsule_kernels::{host, kernels, BlobAllocator, Capsule, KernelKind};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

/// Either a built-in capsule or one tied to a loaded library
enum KernelHandle {
    Builtin(Capsule),
    External(ExternalKernel),
}

impl KernelHandle {
    fn capsule(&self) -> &Capsule {
        match self {
            KernelHandle::Builtin(capsule) => capsule,
            KernelHandle::External(kernel) => kernel.capsule(),
        }
    }
}

/// Outcome of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub name: String,
    pub kind: KernelKind,
    pub signature: &'static str,
    pub context: String,
    pub context_bytes: usize,
    pub external: bool,
    pub outputs: Vec<Vec<f64>>,
}

/// Run a single job with blobs drawn from `allocator`
pub fn run_job(job: &JobConfig, allocator: Arc<dyn BlobAllocator>) -> Result<JobResult> {
    log::info!("Running job '{}' ({})", job.name, job.context);

    let handle = match &job.external {
        Some(ext) => KernelHandle::External(load_external(ext, &job.context, allocator)?),
        None => KernelHandle::Builtin(
            kernels::builtin_capsule(&job.context, allocator)
                .with_context(|| format!("Failed to build capsule for job '{}'", job.name))?,
        ),
    };
    let capsule = handle.capsule();

    let outputs = match capsule.kind() {
        KernelKind::Filter1d => {
            let size = filter_size(job)?;
            job.inputs
                .par_iter()
                .map(|series| host::filter_line(capsule, series, size))
                .collect::<Result<Vec<_>, _>>()
        }
        KernelKind::Stencil => {
            let size = filter_size(job)?;
            job.inputs
                .par_iter()
                .map(|series| host::filter_neighbourhoods(capsule, series, size))
                .collect::<Result<Vec<_>, _>>()
        }
        KernelKind::Transform => {
            let rank = job
                .effective_input_rank()
                .ok_or_else(|| anyhow!("job '{}' has no input rank", job.name))?;
            host::transform_coordinates(capsule, &job.points, rank)
        }
    }
    .with_context(|| format!("Job '{}' failed", job.name))?;

    log::debug!("Job '{}' produced {} output rows", job.name, outputs.len());

    Ok(JobResult {
        name: job.name.clone(),
        kind: capsule.kind(),
        signature: capsule.signature(),
        context: job.context.to_string(),
        context_bytes: capsule.context_len(),
        external: job.external.is_some(),
        outputs,
    })
}

fn filter_size(job: &JobConfig) -> Result<usize> {
    job.effective_filter_size()
        .ok_or_else(|| anyhow!("job '{}' has no filter size", job.name))
}
