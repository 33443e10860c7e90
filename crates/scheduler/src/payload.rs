//! Translate a hydrated due batch into the payload shown by the browser.

use courier_common::types::{BatchType, DueBatch, PushPayload};

/// How many post titles the body lists before collapsing the rest.
const BODY_TITLE_LIMIT: usize = 3;

/// Build the push payload for one batch delivery.
pub fn build_payload(due: &DueBatch) -> PushPayload {
    let post_count = due.batch.post_count.max(0) as u32;

    let title = match due.batch.batch_type {
        BatchType::Immediate => {
            let headline = due
                .posts
                .first()
                .map(|p| p.short_title.as_deref().unwrap_or(&p.title).to_string())
                .unwrap_or_else(|| due.feed_name.clone());
            format!("Breaking: {}", headline)
        }
        BatchType::Hourly => format!(
            "{}: {} this hour",
            due.feed_name,
            story_count(post_count)
        ),
        BatchType::Daily => format!(
            "Daily briefing from {}: {}",
            due.feed_name,
            story_count(post_count)
        ),
    };

    let titles: Vec<&str> = due
        .posts
        .iter()
        .take(BODY_TITLE_LIMIT)
        .map(|p| p.title.as_str())
        .collect();
    let remaining = due.posts.len().saturating_sub(BODY_TITLE_LIMIT);

    let body = if titles.is_empty() {
        "New stories are waiting for you.".to_string()
    } else if remaining > 0 {
        format!("{}; and {} more", titles.join("; "), remaining)
    } else {
        titles.join("; ")
    };

    let image_url = due
        .posts
        .iter()
        .find_map(|p| p.image_url.clone());

    PushPayload {
        title,
        body,
        batch_type: due.batch.batch_type,
        post_count,
        image_url,
    }
}

fn story_count(count: u32) -> String {
    if count == 1 {
        "1 new story".to_string()
    } else {
        format!("{} new stories", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_common::types::{BatchStatus, NotificationBatch, PostSummary};
    use uuid::Uuid;

    fn make_due(batch_type: BatchType, posts: Vec<PostSummary>) -> DueBatch {
        let post_count = posts.len() as i32;
        DueBatch {
            batch: NotificationBatch {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                feed_id: Uuid::new_v4(),
                post_count,
                batch_type,
                scheduled_for: Utc::now(),
                status: BatchStatus::Pending,
                sent_at: None,
                error_message: None,
                created_at: Utc::now(),
            },
            email: "reader@example.com".to_string(),
            username: "reader".to_string(),
            feed_name: "Market Watch".to_string(),
            posts,
        }
    }

    fn make_post(title: &str, short_title: Option<&str>, image_url: Option<&str>) -> PostSummary {
        PostSummary {
            id: Uuid::new_v4(),
            title: title.to_string(),
            short_title: short_title.map(String::from),
            image_url: image_url.map(String::from),
        }
    }

    #[test]
    fn test_hourly_title_names_feed_and_count() {
        let due = make_due(
            BatchType::Hourly,
            vec![
                make_post("Fed holds rates", None, None),
                make_post("Oil slides 2%", None, None),
            ],
        );
        let payload = build_payload(&due);
        assert_eq!(payload.title, "Market Watch: 2 new stories this hour");
        assert_eq!(payload.body, "Fed holds rates; Oil slides 2%");
        assert_eq!(payload.post_count, 2);
    }

    #[test]
    fn test_single_story_is_singular() {
        let due = make_due(
            BatchType::Hourly,
            vec![make_post("Fed holds rates", None, None)],
        );
        let payload = build_payload(&due);
        assert_eq!(payload.title, "Market Watch: 1 new story this hour");
    }

    #[test]
    fn test_daily_title() {
        let due = make_due(
            BatchType::Daily,
            vec![make_post("Earnings roundup", None, None)],
        );
        let payload = build_payload(&due);
        assert_eq!(payload.title, "Daily briefing from Market Watch: 1 new story");
    }

    #[test]
    fn test_immediate_uses_short_title_headline() {
        let due = make_due(
            BatchType::Immediate,
            vec![make_post(
                "Central bank surprises markets with emergency rate cut",
                Some("Emergency rate cut"),
                None,
            )],
        );
        let payload = build_payload(&due);
        assert_eq!(payload.title, "Breaking: Emergency rate cut");
    }

    #[test]
    fn test_body_collapses_beyond_three_titles() {
        let due = make_due(
            BatchType::Daily,
            vec![
                make_post("One", None, None),
                make_post("Two", None, None),
                make_post("Three", None, None),
                make_post("Four", None, None),
                make_post("Five", None, None),
            ],
        );
        let payload = build_payload(&due);
        assert_eq!(payload.body, "One; Two; Three; and 2 more");
    }

    #[test]
    fn test_image_is_first_post_with_one() {
        let due = make_due(
            BatchType::Hourly,
            vec![
                make_post("One", None, None),
                make_post("Two", None, Some("https://cdn.example.com/two.jpg")),
                make_post("Three", None, Some("https://cdn.example.com/three.jpg")),
            ],
        );
        let payload = build_payload(&due);
        assert_eq!(
            payload.image_url.as_deref(),
            Some("https://cdn.example.com/two.jpg")
        );
    }

    #[test]
    fn test_empty_posts_fall_back() {
        let due = make_due(BatchType::Hourly, vec![]);
        let payload = build_payload(&due);
        assert_eq!(payload.body, "New stories are waiting for you.");
        assert!(payload.image_url.is_none());
    }
}
