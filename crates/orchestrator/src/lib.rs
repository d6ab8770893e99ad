/// XAPI Orchestrator
///
/// 通过 XenAPI 编排客户机、磁盘与网卡的生命周期

pub mod cli;
pub mod config;
pub mod directory;
pub mod lifecycle;
pub mod provisioner;
pub mod session;
pub mod task;
pub mod template;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use directory::{DirectoryService, NoopDirectory};
pub use lifecycle::{
    DirectoryCleanup, GuestDeletion, Lookup, Orchestrator, SelectionPolicy, TeardownReport,
    TeardownStrategy,
};
pub use provisioner::Provisioner;
pub use session::Session;
pub use task::{PollPolicy, TaskOutcome, TaskPoller};
pub use template::{MatchPolicy, TemplateMatch, TemplateResolver, TemplateSelector};
