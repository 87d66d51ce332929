pub mod bounded_store;
pub mod value_pool;
