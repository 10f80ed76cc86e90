mod attachment;
mod changelog;
mod feature;
mod milestone;
mod project;
mod subtask;

pub use attachment::*;
pub use changelog::*;
pub use feature::*;
pub use milestone::*;
pub use project::*;
pub use subtask::*;
