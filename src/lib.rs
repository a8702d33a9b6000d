pub mod activity;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod schedule;
pub mod trv;
pub mod validation;

#[cfg(test)]
mod test_support;
