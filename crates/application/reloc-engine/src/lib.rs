pub mod dispatch;
pub mod mapper;
pub mod pack;
pub mod relocate;
pub mod reporter;
pub mod search;
pub mod tracker;

// Re-export the packing surface
pub use dispatch::{
    InProcessDispatcher, LibraryDispatcher, NestedOutcome, NestedRequest, NestedStatus,
    NestedSummary, ProcessDispatcher,
};
pub use mapper::DirectoryMapper;
pub use pack::{LibraryIsolation, PackError, PackOptions, PackReport, PackStatus, Packer};
pub use relocate::{
    FailedTransfer, OutcomeStatus, PassSummary, RelocatedLibrary, RelocationPass, Relocator,
    TransferOutcome,
};
pub use reporter::{
    ChannelReporter, DiagnosticLog, NoopReporter, TracingReporter, TransferEvent,
    TransferReporter,
};
pub use search::{recover_missing, RecoveredRecord};
pub use tracker::{PackSnapshot, PackTracker};
