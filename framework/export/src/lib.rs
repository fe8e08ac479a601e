mod dry_run;
mod exporter;
mod window;

pub mod prelude {
    pub use crate::dry_run::DryRunExporter;
    pub use crate::exporter::{CommandExporter, MetricsExporter};
    pub use crate::window::{
        resolution_tag, ExportRequest, ExportWindow, ExportWindowPlanner, WindowMode,
        DEFAULT_RESOLUTION,
    };
}
