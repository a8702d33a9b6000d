pub mod service;

pub use service::TrvService;
