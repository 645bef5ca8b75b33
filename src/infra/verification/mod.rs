pub mod sqlite_policy_store;

pub use sqlite_policy_store::SqlitePolicyStore;
