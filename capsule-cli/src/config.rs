//! Job file loading and validation

use anyhow::{bail, Context, Result};
use capsule_kernels::{ContextData, KernelKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from jobs.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Upper bound on live context blob bytes across all jobs
    pub max_context_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    pub path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub include_accounting: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            path: None,
            include_accounting: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

/// One capsule plus the data to push through it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    pub name: String,
    pub context: ContextData,
    /// Use a kernel from a shared library instead of the built-in one
    #[serde(default)]
    pub external: Option<ExternalKernelConfig>,
    /// Input series for line and neighbourhood filters
    #[serde(default)]
    pub inputs: Vec<Vec<f64>>,
    /// Host-side filter size; defaults to the window size or weight count
    #[serde(default)]
    pub filter_size: Option<usize>,
    /// Output coordinates for transforms
    #[serde(default)]
    pub points: Vec<Vec<isize>>,
    /// Input rank for transforms; defaults to the rank of the first point
    #[serde(default)]
    pub input_rank: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExternalKernelConfig {
    pub library: PathBuf,
    pub symbol: String,
    pub kind: KernelKind,
}

impl JobConfig {
    pub fn new(name: impl Into<String>, context: ContextData) -> Self {
        Self {
            name: name.into(),
            context,
            external: None,
            inputs: Vec::new(),
            filter_size: None,
            points: Vec::new(),
            input_rank: None,
        }
    }

    /// Builder method: add an input series
    pub fn with_input(mut self, series: Vec<f64>) -> Self {
        self.inputs.push(series);
        self
    }

    /// Builder method: add an output coordinate
    pub fn with_point(mut self, point: Vec<isize>) -> Self {
        self.points.push(point);
        self
    }

    /// Builder method: override the host-side filter size
    pub fn with_filter_size(mut self, size: usize) -> Self {
        self.filter_size = Some(size);
        self
    }

    /// Builder method: override the transform input rank
    pub fn with_input_rank(mut self, rank: usize) -> Self {
        self.input_rank = Some(rank);
        self
    }

    /// Call shape this job drives
    pub fn kind(&self) -> KernelKind {
        match &self.external {
            Some(ext) => ext.kind,
            None => self.context.kind(),
        }
    }

    pub fn effective_filter_size(&self) -> Option<usize> {
        self.filter_size.or(match &self.context {
            ContextData::Window { size } => Some(*size),
            ContextData::Weights { values } => Some(values.len()),
            ContextData::Shift { .. } => None,
        })
    }

    pub fn effective_input_rank(&self) -> Option<usize> {
        self.input_rank
            .or_else(|| self.points.first().map(Vec::len))
    }

    fn validate(&self) -> Result<()> {
        match self.kind() {
            KernelKind::Filter1d | KernelKind::Stencil => {
                if self.inputs.is_empty() {
                    bail!("job '{}' has no input series", self.name);
                }
                if self.effective_filter_size().is_none() {
                    bail!("job '{}' needs a filter_size", self.name);
                }
            }
            KernelKind::Transform => {
                if self.points.is_empty() {
                    bail!("job '{}' has no points", self.name);
                }
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Check job names are unique and every job has data for its kernel
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if !seen.insert(job.name.as_str()) {
                bail!("duplicate job name '{}'", job.name);
            }
            job.validate()?;
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}
