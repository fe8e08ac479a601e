use std::fs::File;
use std::io::{BufWriter, Write};

use chaos_tunnel_core::prelude::{parse_duration, ChaosResult, PipelineLog};
use itertools::Itertools;

use crate::exporter::MetricsExporter;
use crate::window::ExportRequest;

/// Writes an empty time series with the layout the real exporter would produce.
///
/// The file has a `time` column holding every sample timestamp in the window plus one empty
/// `<service>_cpu` and `<service>_mem` column per service.
#[derive(Debug, Clone, Default)]
pub struct DryRunExporter {
    log: PipelineLog,
}

impl DryRunExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, log: PipelineLog) -> Self {
        self.log = log;
        self
    }
}

impl MetricsExporter for DryRunExporter {
    fn export(&self, request: &ExportRequest) -> ChaosResult<()> {
        let columns = request
            .services
            .iter()
            .flat_map(|service| [format!("{service}_cpu"), format!("{service}_mem")])
            .collect::<Vec<_>>();
        let empty_row = ",".repeat(columns.len());

        let mut writer = BufWriter::new(File::create(&request.output)?);
        writeln!(
            writer,
            "{}",
            std::iter::once("time".to_string()).chain(columns).join(",")
        )?;

        // Resolutions the parser does not understand still produce a header-only file
        let step = parse_duration(&request.resolution)
            .map(|s| s.as_secs() as i64)
            .unwrap_or(0);
        let mut rows = 0;
        if step > 0 {
            let mut t = request.window.start;
            while t < request.window.end {
                writeln!(writer, "{t}{empty_row}")?;
                t += step;
                rows += 1;
            }
        }
        writer.flush()?;

        self.log.record(
            "dry-run",
            format_args!(
                "wrote {} with {rows} rows for step {}",
                request.output.display(),
                request.resolution
            ),
        );
        Ok(())
    }
}
