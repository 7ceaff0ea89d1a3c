pub mod app_services;
pub mod diary_cache;
pub mod diary_collection;
pub mod diary_deletion;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod settings;
pub mod task_queue;

#[cfg(test)]
mod test_utils;
