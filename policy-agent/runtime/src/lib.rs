#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use policy_agent_calc as calc;
pub use policy_agent_core as core;
pub use policy_agent_labels as labels;

mod admin;
mod args;
mod input;
mod local;
mod process;
mod sinks;

pub use self::{
    args::{Args, LogFilter, LogFormat},
    local::LocalEndpointFilter,
    sinks::{ActiveSet, EndpointMatchCounts},
};
