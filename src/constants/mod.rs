mod logging;
pub use logging::*;

mod worker;
pub use worker::*;

mod queue;
pub use queue::*;
