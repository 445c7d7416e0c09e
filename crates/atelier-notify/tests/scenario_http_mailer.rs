//! HttpMailer against a mock email API.

use atelier_notify::{EmailMessage, HttpMailer, MailError, Mailer};
use httpmock::prelude::*;

fn message() -> EmailMessage {
    EmailMessage {
        to: "buyer@atelier.test".into(),
        subject: "Atelier: order received".into(),
        html: "<p>hi</p>".into(),
        text: "hi".into(),
    }
}

#[tokio::test]
async fn posts_json_with_bearer_key() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/emails")
                .header("authorization", "Bearer re_test_key")
                .json_body(serde_json::json!({
                    "from": "Atelier <orders@atelier.test>",
                    "to": ["buyer@atelier.test"],
                    "subject": "Atelier: order received",
                    "html": "<p>hi</p>",
                    "text": "hi"
                }));
            then.status(200).json_body(serde_json::json!({ "id": "msg_1" }));
        })
        .await;

    let mailer = HttpMailer::new(
        "re_test_key".into(),
        "Atelier <orders@atelier.test>".into(),
        format!("{}/", server.base_url()),
    );
    mailer.send(&message()).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn non_success_status_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/emails");
            then.status(422).body("invalid from");
        })
        .await;

    let mailer = HttpMailer::new("k".into(), "x@atelier.test".into(), server.base_url());
    let err = mailer.send(&message()).await.unwrap_err();
    assert_eq!(
        err,
        MailError::Rejected {
            status: 422,
            body: "invalid from".into()
        }
    );
}

#[test]
fn debug_redacts_api_key() {
    let mailer = HttpMailer::new("re_secret".into(), "x@atelier.test".into(), "http://x".into());
    let dbg = format!("{mailer:?}");
    assert!(!dbg.contains("re_secret"));
    assert!(dbg.contains("REDACTED"));
}
