mod memory;
mod postgres;
mod store;

pub use memory::InMemoryStore;
pub use postgres::PgDiscussionStore;
pub use store::DiscussionStore;

#[cfg(test)]
pub use store::MockDiscussionStore;
