pub mod local_store;
pub mod object_store;
pub mod retention_service;
pub mod scheduler;
pub mod transfer_service;

#[cfg(test)]
pub mod testing;
