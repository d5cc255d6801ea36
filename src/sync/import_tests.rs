//! 导入与匹配的测试

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration as StdDuration;

    use chrono::{DateTime, Duration, Utc};
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::super::fake::{FakeRemote, GROUP, SUBGROUP, remote_event, remote_id, spond_id, team_mapping};
    use super::super::import::{IMPORT_BATCH_CAP, ImportOptions, TeamLookup, import_events};
    use super::super::matcher::decide;
    use super::super::types::MatchAction;
    use crate::spond::client::SpondClient;
    use crate::store::memory::MemoryEventStore;
    use crate::store::{EventStatus, EventStore, EventType};

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn now() -> DateTime<Utc> {
        at("2025-06-01T12:00:00Z")
    }

    fn arena() -> serde_json::Value {
        json!({"location": {"feature": "Nordhagen Arena", "address": "Idrettsveien 4"}})
    }

    #[tokio::test]
    async fn nearby_unlinked_event_at_same_venue_is_linked() {
        let store = MemoryEventStore::new();
        let local_id = store.seed_event("", at("2025-06-10T18:10:00Z"), vec![], Some("Nordhagen Arena"));
        store.modify_event(local_id, |e| e.description = Some("Ta med vannflaske".into()));
        let before = store.event(local_id).unwrap();

        let remote = FakeRemote::with_events(vec![remote_event(
            &remote_id(1),
            "U15 Practice",
            "2025-06-10T18:00:00Z",
            arena(),
        )]);

        let result = import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert!(result.success);
        assert_eq!(result.linked, 1);
        assert_eq!(result.imported, 0);
        assert_eq!(store.events().len(), 1);

        let after = store.event(local_id).unwrap();
        assert_eq!(after.title, before.title);
        assert_eq!(after.description, before.description);
        assert_eq!(after.start_time, before.start_time);
        assert_eq!(after.remote_event_id().unwrap().as_str(), remote_id(1));
        assert!(after.remote_payload.is_some());
    }

    #[tokio::test]
    async fn event_outside_window_creates_new_row() {
        let store = MemoryEventStore::new();
        store.seed_event("Trening", at("2025-06-10T18:20:00Z"), vec![], Some("Nordhagen Arena"));

        let remote = FakeRemote::with_events(vec![remote_event(
            &remote_id(1),
            "U15 Practice",
            "2025-06-10T18:00:00Z",
            arena(),
        )]);
        let result = import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert_eq!(result.imported, 1);
        assert_eq!(result.linked, 0);
        let created = store
            .events()
            .into_iter()
            .find(|e| e.remote_link.is_some())
            .unwrap();
        assert_eq!(created.title, "U15 Practice");
        assert_eq!(created.event_type, EventType::Practice);
        assert_eq!(created.status, EventStatus::Planned);
        assert_eq!(created.location_name.as_deref(), Some("Nordhagen Arena, Idrettsveien 4"));
    }

    #[tokio::test]
    async fn different_venue_is_not_linked() {
        let store = MemoryEventStore::new();
        store.seed_event("Kamp", at("2025-06-10T18:05:00Z"), vec![], Some("Bislett stadion"));

        let remote = FakeRemote::with_events(vec![remote_event(
            &remote_id(1),
            "U15 Practice",
            "2025-06-10T18:00:00Z",
            arena(),
        )]);
        let result = import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert_eq!(result.imported, 1);
        assert_eq!(store.events().len(), 2);
    }

    #[tokio::test]
    async fn earliest_candidate_wins() {
        let store = MemoryEventStore::new();
        let later = store.seed_event("B", at("2025-06-10T18:10:00Z"), vec![], None);
        let earlier = store.seed_event("A", at("2025-06-10T17:50:00Z"), vec![], None);

        let remote = remote_event(&remote_id(1), "Trening", "2025-06-10T18:00:00Z", json!({}));
        match decide(&store, &remote).await.unwrap() {
            MatchAction::Link(candidate) => assert_eq!(candidate.id, earlier),
            other => panic!("unexpected action: {:?}", other),
        }
        assert!(store.event(later).unwrap().remote_link.is_none());
    }

    #[tokio::test]
    async fn reimport_updates_and_keeps_links_unique() {
        let store = MemoryEventStore::new();
        store.seed_event("", at("2025-06-10T18:00:00Z"), vec![], None);
        store.seed_event("", at("2025-06-10T18:05:00Z"), vec![], None);

        let remote = FakeRemote::with_events(vec![
            remote_event(&remote_id(1), "Trening", "2025-06-10T18:00:00Z", json!({})),
            remote_event(&remote_id(2), "Trening", "2025-06-10T18:00:00Z", json!({})),
            remote_event(&remote_id(3), "Trening", "2025-06-10T18:00:00Z", json!({})),
        ]);

        let first = import_events(&remote, &store, &ImportOptions::default(), now()).await;
        assert_eq!((first.linked, first.imported), (2, 1));

        let second = import_events(&remote, &store, &ImportOptions::default(), now()).await;
        assert_eq!((second.updated, second.linked, second.imported), (3, 0, 0));

        let events = store.events();
        let linked: Vec<_> = events.iter().filter_map(|e| e.remote_event_id()).collect();
        let unique: HashSet<_> = linked.iter().collect();
        assert_eq!(linked.len(), 3);
        assert_eq!(unique.len(), 3);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn update_does_not_overwrite_assigned_teams() {
        let store = MemoryEventStore::new();
        store.link_team_group(team_mapping(1, GROUP, None)).await.unwrap();

        let remote = FakeRemote::with_events(vec![remote_event(
            &remote_id(1),
            "Kamp mot Lyn",
            "2025-06-10T18:00:00Z",
            json!({}),
        )]);
        import_events(&remote, &store, &ImportOptions::default(), now()).await;
        let id = store.events()[0].id;
        assert_eq!(store.event(id).unwrap().team_ids, vec![1]);

        store.unlink_team_group(1).await.unwrap();
        store.link_team_group(team_mapping(2, GROUP, None)).await.unwrap();
        let result = import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert_eq!(result.updated, 1);
        assert_eq!(store.event(id).unwrap().team_ids, vec![1]);
    }

    #[tokio::test]
    async fn update_fills_teams_when_empty() {
        let store = MemoryEventStore::new();
        let remote = FakeRemote::with_events(vec![remote_event(
            &remote_id(1),
            "Kamp",
            "2025-06-10T18:00:00Z",
            json!({}),
        )]);
        import_events(&remote, &store, &ImportOptions::default(), now()).await;
        let id = store.events()[0].id;
        assert!(store.event(id).unwrap().team_ids.is_empty());

        store.link_team_group(team_mapping(7, GROUP, None)).await.unwrap();
        import_events(&remote, &store, &ImportOptions::default(), now()).await;
        assert_eq!(store.event(id).unwrap().team_ids, vec![7]);
    }

    #[tokio::test]
    async fn malformed_item_is_reported_once_and_batch_continues() {
        let store = MemoryEventStore::new();
        let mut broken = remote_event(&remote_id(2), "Broken", "2025-06-11T18:00:00Z", json!({}));
        broken.start_timestamp = None;

        let remote = FakeRemote::with_events(vec![
            remote_event(&remote_id(1), "Trening", "2025-06-10T18:00:00Z", json!({})),
            broken,
            remote_event(&remote_id(3), "Kamp", "2025-06-12T18:00:00Z", json!({})),
        ]);
        let result = import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert!(result.success);
        assert_eq!(result.imported, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].item.contains(&remote_id(2)));
        assert!(result.errors[0].message.contains("missing start timestamp"));
    }

    #[tokio::test]
    async fn wrongly_typed_item_from_spond_is_reported_once() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/login")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"loginToken":"tok-1"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/sponds/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"id": remote_id(1), "heading": "Trening", "startTimestamp": "2025-06-10T18:00:00Z"},
                    {"id": remote_id(2), "heading": "Kamp", "startTimestamp": 1749578400000u64},
                    {"id": remote_id(3), "heading": "Kamp", "startTimestamp": "2025-06-12T18:00:00Z", "cancelled": null}
                ])
                .to_string(),
            )
            .create_async()
            .await;
        let client = SpondClient::new(
            &server.url(),
            "coach@example.com",
            "pw",
            StdDuration::from_secs(5),
        )
        .unwrap();
        let store = MemoryEventStore::new();

        let result = import_events(&client, &store, &ImportOptions::default(), now()).await;

        assert!(result.success);
        assert_eq!(result.imported, 1);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].item, format!("Kamp ({})", remote_id(2)));
        assert!(result.errors[0].message.contains("malformed event"));
        assert_eq!(result.errors[1].item, format!("Kamp ({})", remote_id(3)));
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.events()[0].title, "Trening");
    }

    #[tokio::test]
    async fn update_refreshes_schedule_and_status_of_linked_event() {
        let store = MemoryEventStore::new();
        let remote = FakeRemote::with_events(vec![remote_event(
            &remote_id(1),
            "Trening",
            "2025-06-10T18:00:00Z",
            json!({"description": "Ta med sko", "endTimestamp": "2025-06-10T19:30:00Z"}),
        )]);
        import_events(&remote, &store, &ImportOptions::default(), now()).await;
        let id = store.events()[0].id;
        let before = store.event(id).unwrap();
        assert_eq!(before.event_type, EventType::Practice);
        assert_eq!(before.status, EventStatus::Planned);

        // 远端改期、取消，描述被清空
        *remote.events.lock().unwrap() = vec![remote_event(
            &remote_id(1),
            "Kamp mot Lyn",
            "2025-06-12T17:00:00Z",
            json!({
                "description": null,
                "endTimestamp": "2025-06-12T18:30:00Z",
                "cancelled": true
            }),
        )];
        let result = import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert_eq!(result.updated, 1);
        let after = store.event(id).unwrap();
        assert_eq!(after.start_time, at("2025-06-12T17:00:00Z"));
        assert_eq!(after.end_time, Some(at("2025-06-12T18:30:00Z")));
        assert_eq!(after.status, EventStatus::Cancelled);
        assert_eq!(after.event_type, EventType::Game);
        assert_eq!(after.description.as_deref(), Some("Ta med sko"));
        assert_eq!(after.title, before.title);
        assert_eq!(store.events().len(), 1);
    }

    #[tokio::test]
    async fn invalid_remote_id_is_an_item_error() {
        let store = MemoryEventStore::new();
        let remote = FakeRemote::with_events(vec![remote_event(
            "not-a-spond-id",
            "Trening",
            "2025-06-10T18:00:00Z",
            json!({}),
        )]);
        let result = import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert!(result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].item, "Trening (not-a-spond-id)");
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn cancelled_event_within_a_day_is_cancelled() {
        let store = MemoryEventStore::new();
        let start = (now() + Duration::hours(1)).to_rfc3339();
        let remote = FakeRemote::with_events(vec![remote_event(
            &remote_id(1),
            "Trening",
            &start,
            json!({"cancelled": true}),
        )]);
        import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert_eq!(store.events()[0].status, EventStatus::Cancelled);
    }

    #[tokio::test]
    async fn subgroup_mapping_wins_over_parent() {
        let store = MemoryEventStore::new();
        store.link_team_group(team_mapping(1, GROUP, None)).await.unwrap();
        store
            .link_team_group(team_mapping(2, SUBGROUP, Some(GROUP)))
            .await
            .unwrap();

        let event = remote_event(
            &remote_id(1),
            "U15 Practice",
            "2025-06-10T18:00:00Z",
            json!({"recipients": {"group": {
                "id": "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb",
                "subGroups": [{"id": SUBGROUP.to_lowercase()}]
            }}}),
        );
        let lookup = TeamLookup::new(&store.find_team_group_mappings().await.unwrap());
        assert_eq!(lookup.teams_for(&event), vec![2]);

        let whole_group = remote_event(&remote_id(2), "Felles", "2025-06-10T18:00:00Z", json!({}));
        assert_eq!(lookup.teams_for(&whole_group), vec![1]);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_without_touching_last_sync() {
        let store = MemoryEventStore::new();
        store.save_integration_config("coach@example.com", "pw").await.unwrap();
        let remote = FakeRemote::default();
        *remote.fail_fetch.lock().unwrap() = true;

        let result = import_events(&remote, &store, &ImportOptions::default(), now()).await;

        assert!(!result.success);
        assert!(result.message.unwrap().contains("invalid credentials"));
        let config = store.get_active_integration_config().await.unwrap().unwrap();
        assert!(config.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn fetch_uses_window_and_batch_cap() {
        let store = MemoryEventStore::new();
        store.save_integration_config("coach@example.com", "pw").await.unwrap();
        let remote = FakeRemote::default();
        let options = ImportOptions {
            group_id: Some(spond_id(GROUP)),
            days_ahead: 10,
            days_behind: 2,
        };

        let result = import_events(&remote, &store, &options, now()).await;
        assert!(result.success);

        let filter = remote.last_filter.lock().unwrap().clone().unwrap();
        assert_eq!(filter.max, Some(IMPORT_BATCH_CAP));
        assert_eq!(filter.min_start, Some(now() - Duration::days(2)));
        assert_eq!(filter.max_start, Some(now() + Duration::days(10)));
        assert_eq!(filter.group_id, Some(spond_id(GROUP)));

        let config = store.get_active_integration_config().await.unwrap().unwrap();
        assert_eq!(config.last_sync_at, Some(now()));
    }
}
