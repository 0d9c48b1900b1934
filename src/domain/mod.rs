mod period;
mod search;
mod task;
mod types;

pub use period::*;
pub use search::*;
pub use task::*;
pub use types::*;
