mod builder;
mod descriptor;
mod kind;
mod manifest;

pub mod prelude {
    pub use crate::builder::{FaultSpecBuilder, DEFAULT_NAMESPACE, DEFAULT_SELECTOR_KEY};
    pub use crate::descriptor::{FaultDescriptor, FaultIdentity, ResourceKind, Selector, Stressor};
    pub use crate::kind::{Direction, FaultKind, SelectorMode};
}
