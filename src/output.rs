use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{
    BuildSummary, CacheDeleteResult, CacheListResult, CladeSummary, CoreSummary, FusionSummary,
    GeneDuplicationReport, NeofunctionalizationReport, ProgressEvent, ProgressSink,
    RedundancyReport,
};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_build(result: &BuildSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fusion(result: &FusionSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_core(result: &CoreSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clades(result: &CladeSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_redundancy(result: &RedundancyReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_neofunctionalizations(result: &NeofunctionalizationReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_duplications(result: &GeneDuplicationReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cache_list(result: &CacheListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cache_delete(result: &CacheDeleteResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the `tracing` subscriber on stderr.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
