use tempfile::TempDir;

use crate::{db::Stores, schedule::ScheduleService, trv::TrvService};

/// Both services over fresh stores rooted in `tmp`.
pub async fn services(tmp: &TempDir) -> (TrvService, ScheduleService) {
    let stores = Stores::open(tmp.path()).await.unwrap();
    (TrvService::new(&stores), ScheduleService::new(&stores))
}
