pub mod api;
pub mod manager;
pub mod model;
pub mod queue;
pub mod runner;
pub mod task_store;
pub mod task_table;
