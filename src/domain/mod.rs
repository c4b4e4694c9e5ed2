pub mod chain;
pub mod cms;
pub mod finding;
pub mod message;
pub mod types;
pub mod verdict;
