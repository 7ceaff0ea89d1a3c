use std::time::Duration;

use chrono::{TimeZone, Utc};
use core_types::Diary;

pub fn diary(id: &str, owner_id: &str) -> Diary {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Diary {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        title: format!("Diary {}", id),
        description: String::new(),
        cover_image_url: String::new(),
        is_private: false,
        video_count: 0,
        is_deleted: false,
        created_at,
        updated_at: created_at,
        start_time: None,
    }
}

/// Polls `condition` until it holds. Panics after a couple of seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        async_std::task::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}
