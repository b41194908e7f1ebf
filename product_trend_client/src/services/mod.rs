pub mod analysis;
pub mod comparison;
pub mod history;
pub mod status;

pub use analysis::AnalysisService;
pub use comparison::{ComparisonService, ComparisonState};
pub use history::AnalysisHistoryService;
pub use status::{BackendStatus, StatusMonitor};
