pub mod config;
pub mod event;
pub mod normalize;
pub mod observability;
pub mod queue;
pub mod sink;
pub mod storage;
pub mod worker;
