mod coordinator;
mod loop_detector;

pub use coordinator::{CoordinatorBuilder, Relogin, TokenRefreshCoordinator, TokenRefresher};
pub use loop_detector::{DEFAULT_THRESHOLD, DEFAULT_WINDOW, LoopDetector};
