//! Background task keeping contest statuses in line with their time windows.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info};

use crate::state::Store;

pub const REFRESH_EVERY: Duration = Duration::from_secs(60);

/// Run one refresh pass immediately, then one per `every`.
pub fn spawn_status_updater(store: Arc<Store>, every: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      // First tick completes immediately.
      ticker.tick().await;
      let changed = store.refresh_contest_statuses(Utc::now()).await;
      if changed > 0 {
        info!(target: "devforces", changed, "Contest statuses updated");
      } else {
        debug!(target: "devforces", "Contest statuses unchanged");
      }
    }
  })
}
