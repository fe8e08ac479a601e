mod clock;
mod duration;
mod error;
mod pipeline_log;
mod progress;
mod quantity;
mod shutdown;

pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::duration::{parse_duration, Seconds};
    pub use crate::error::{ChaosError, ChaosResult};
    pub use crate::pipeline_log::PipelineLog;
    pub use crate::quantity::{Latency, MemorySize};
    pub use crate::shutdown::{CancelListener, ShutdownHandle};
}
