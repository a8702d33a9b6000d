pub mod service;
pub mod window;

pub use service::ScheduleService;
