//! Report generation (TXT and JSON)

use crate::jobs::JobResult;
use anyhow::Result;
use capsule_kernels::AllocationStats;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub tool_version: &'static str,
    pub library_version: &'static str,
    pub jobs: Vec<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounting: Option<AllocationStats>,
}

impl Report {
    pub fn new(jobs: Vec<JobResult>, accounting: Option<AllocationStats>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION"),
            library_version: capsule_kernels::VERSION,
            jobs,
            accounting,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_txt(&self) -> Result<String> {
        let mut out = String::new();
        self.write_txt(&mut out)?;
        Ok(out)
    }

    fn write_txt(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "═══════════════════════════════════════════════")?;
        writeln!(out, "  Capsule Kernel Report")?;
        writeln!(out, "═══════════════════════════════════════════════")?;
        writeln!(out, "Generated: {}", self.generated_at)?;
        writeln!(
            out,
            "Versions:  cli {} / library {}",
            self.tool_version, self.library_version
        )?;

        for job in &self.jobs {
            writeln!(out, "\n[{}] {}", job.kind, job.name)?;
            writeln!(out, "  signature: {}", job.signature)?;
            writeln!(
                out,
                "  context:   {} ({} bytes{})",
                job.context,
                job.context_bytes,
                if job.external { ", external" } else { "" }
            )?;
            for (i, row) in job.outputs.iter().enumerate() {
                writeln!(out, "  #{:<3} {}", i, format_row(row))?;
            }
        }

        if let Some(stats) = &self.accounting {
            writeln!(out, "\nContext blobs:")?;
            writeln!(out, "  Allocated: {}", stats.allocations)?;
            writeln!(out, "  Freed:     {}", stats.deallocations)?;
            writeln!(out, "  Refused:   {}", stats.failed)?;
            writeln!(out, "  Live:      {} bytes", stats.live_bytes)?;
        }
        Ok(())
    }
}

fn format_row(row: &[f64]) -> String {
    let values: Vec<String> = row.iter().map(|v| format!("{:.4}", v)).collect();
    format!("[{}]", values.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_kernels::KernelKind;

    fn sample() -> Report {
        Report::new(
            vec![JobResult {
                name: "smooth".to_string(),
                kind: KernelKind::Filter1d,
                signature: KernelKind::Filter1d.signature(),
                context: "window=3".to_string(),
                context_bytes: 8,
                external: false,
                outputs: vec![vec![2.0, 3.0, 4.0]],
            }],
            Some(AllocationStats {
                allocations: 1,
                deallocations: 1,
                live_bytes: 0,
                failed: 0,
            }),
        )
    }

    #[test]
    fn test_txt_report() {
        let txt = sample().to_txt().unwrap();
        assert!(txt.contains("[filter1d] smooth"));
        assert!(txt.contains("[2.0000, 3.0000, 4.0000]"));
        assert!(txt.contains("Freed:     1"));
    }

    #[test]
    fn test_json_report() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["jobs"][0]["kind"], "filter1d");
        assert_eq!(json["jobs"][0]["outputs"][0][1], 3.0);
        assert_eq!(json["accounting"]["deallocations"], 1);
    }

    #[test]
    fn test_accounting_omitted() {
        let mut report = sample();
        report.accounting = None;
        assert!(!report.to_txt().unwrap().contains("Context blobs"));
        assert!(!report.to_json().unwrap().contains("accounting"));
    }
}
