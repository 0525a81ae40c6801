pub mod producer;
pub mod queue;
pub mod sender;
pub mod worker;

pub use producer::*;
pub use queue::*;
pub use sender::*;
pub use worker::*;
