//! HTTP contract tests for `HttpReminderApi` against a mock backend.

use std::time::Duration;

use dosemate_core::{ReminderId, ReminderStatus};
use dosemate_notify::{HttpReminderApi, NotifyError, ReminderApi};
use serde_json::json;
use wiremock::matchers::{any, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, token: Option<&str>) -> HttpReminderApi {
    HttpReminderApi::new(
        &format!("{}/api/", server.uri()),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_status_update_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/reminders/r1/status"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({ "status": "MISSED" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, Some("secret"));
    api.update_status(&ReminderId::new("r1").unwrap(), ReminderStatus::Missed)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_snooze_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/reminders/42/snooze"))
        .and(body_json(json!({ "minutes": 10 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, None)
        .snooze(&ReminderId::from(42), 10)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_special_character_ids_stay_in_their_segment() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let api = client(&server, None);
    let ids = ["a/b", "x?y=1", "../medicines/3", "säft"];
    for id in ids {
        let id = ReminderId::new(id).unwrap();
        api.update_status(&id, ReminderStatus::Taken).await.unwrap();
    }
    api.snooze(&ReminderId::new("a b#c").unwrap(), 5).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
    assert_eq!(
        paths,
        vec![
            "/api/reminders/a%2Fb/status",
            "/api/reminders/x%3Fy=1/status",
            "/api/reminders/..%2Fmedicines%2F3/status",
            "/api/reminders/s%C3%A4ft/status",
            "/api/reminders/a%20b%23c/snooze",
        ]
    );
    assert!(requests.iter().all(|r| r.url.query().is_none()));
    assert!(requests.iter().all(|r| r.method.as_str() == "PUT"));
}

#[tokio::test]
async fn test_lists_decode_mixed_id_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reminders/pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1,
                "medicineId": 9,
                "medicineName": "Aspirin",
                "scheduledAt": "2024-05-01T08:00:00Z",
                "status": "PENDING",
                "snoozeCount": 0
            },
            { "id": "abc", "status": "SOMETHING_NEW" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reminders/upcoming"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let api = client(&server, None);
    let pending = api.pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, ReminderId::from(1));
    assert_eq!(pending[0].medicine_name.as_deref(), Some("Aspirin"));
    assert_eq!(pending[0].status, Some(ReminderStatus::Pending));
    assert_eq!(pending[1].id.as_str(), "abc");
    assert_eq!(pending[1].status, Some(ReminderStatus::Unknown));

    assert!(api.upcoming().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/reminders/1/status"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/reminders/2/status"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/reminders/3/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = client(&server, None);
    let taken = ReminderStatus::Taken;

    let err = api.update_status(&ReminderId::from(1), taken).await.unwrap_err();
    assert!(matches!(err, NotifyError::Unauthorized(_)));
    assert!(!err.is_retryable());

    let err = api.update_status(&ReminderId::from(2), taken).await.unwrap_err();
    assert!(matches!(err, NotifyError::NotFound(_)));

    let err = api.update_status(&ReminderId::from(3), taken).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.is_network_error());
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let api = HttpReminderApi::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
    let err = api.pending().await.unwrap_err();
    assert!(err.is_network_error(), "got {err:?}");
}
