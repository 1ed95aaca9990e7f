pub mod countdown;
pub mod model;
pub mod recovery;
pub mod scheduler;
pub mod store;
pub mod trigger;
