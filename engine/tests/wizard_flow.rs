//! End-to-end wizard flow against a mocked Gemini backend.

use doppel_engine::session::{RecomposeSlot, StepState, WizardSession, WizardSettings};
use doppel_engine::{Photo, pipeline};
use doppel_gateway::GeminiClient;
use doppel_types::{CoinPack, ImageMime, WizardError, WizardStep};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/models/gemini-2.5-flash-image:generateContent";

fn text_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }] }
        }]
    }))
}

fn image_response(payload: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": { "parts": [{
                "inlineData": { "mimeType": "image/png", "data": payload }
            }] }
        }]
    }))
}

/// Describe requests carry the analysis prompt; everything else (the four
/// portrait prompts and recompose) gets image data back.
async fn mock_backend() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("detailed, and flattering description"))
        .respond_with(text_response("friendly face, warm smile"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(image_response("cG9ydHJhaXQ="))
        .mount(&server)
        .await;

    server
}

fn photos(n: usize) -> Vec<Photo> {
    (0..n)
        .map(|i| Photo::from_bytes(vec![0xFF, 0xD8, i as u8], ImageMime::Jpeg).unwrap())
        .collect()
}

#[tokio::test]
async fn full_session_from_upload_to_recompose() {
    let server = mock_backend().await;
    let client = GeminiClient::new("test-key").with_base_url(server.uri());

    let mut session = WizardSession::new();
    assert_eq!(session.balance(), 20);

    // Upload five photos and pay.
    session.add_photos(photos(5)).unwrap();
    session.proceed_to_payment().unwrap();
    let ticket = session.confirm_payment(None).unwrap();
    assert_eq!(session.step(), WizardStep::Generating);

    // Generation: one describe call plus four portrait calls.
    let outcome = pipeline::run_generation(&client, &ticket).await;
    session.apply_generation(ticket.token, outcome);
    let StepState::Results { twin } = session.state() else {
        panic!("expected Results, got {:?}", session.step());
    };
    assert_eq!(twin.description.as_str(), "friendly face, warm smile");
    assert_eq!(twin.gallery.images().len(), 4);
    let reference = twin.gallery.images()[0].as_uri().to_string();

    session.save_and_continue().unwrap();
    assert_eq!(session.step(), WizardStep::Subscribe);

    // Buy a starter pack, then spend coins on a recompose.
    assert_eq!(session.purchase(CoinPack::Starter).unwrap(), 40);

    let ticket = session.begin_recompose(&reference).unwrap();
    assert_eq!(session.balance(), 40, "authorization does not debit");

    let outcome = pipeline::run_recompose(&client, &ticket).await;
    session.apply_recompose(ticket.token, outcome);
    assert_eq!(session.balance(), 30);
    assert!(matches!(
        session.state(),
        StepState::Subscribe {
            recompose: RecomposeSlot::Ready(_),
            ..
        }
    ));
}

#[tokio::test]
async fn generation_failure_returns_to_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
        .mount(&server)
        .await;

    let client = GeminiClient::new("test-key").with_base_url(server.uri());

    let mut session = WizardSession::new();
    session.add_photos(photos(6)).unwrap();
    session.proceed_to_payment().unwrap();
    let ticket = session.confirm_payment(Some("twin")).unwrap();

    let outcome = pipeline::run_generation(&client, &ticket).await;
    assert!(matches!(outcome, Err(WizardError::RemoteService)));

    session.apply_generation(ticket.token, outcome);
    let StepState::Upload { photos, notice } = session.state() else {
        panic!("expected Upload after failure");
    };
    assert_eq!(photos.len(), 6, "photos are retained for another attempt");
    assert!(notice.as_ref().unwrap().message().contains("AI Twin"));
}

#[tokio::test]
async fn recompose_blocked_without_enough_coins() {
    let server = mock_backend().await;
    let client = GeminiClient::new("test-key").with_base_url(server.uri());

    let mut session = WizardSession::with_settings(WizardSettings {
        starting_coins: 5,
        recompose_cost: 10,
    });
    session.add_photos(photos(5)).unwrap();
    session.proceed_to_payment().unwrap();
    let ticket = session.confirm_payment(None).unwrap();
    let outcome = pipeline::run_generation(&client, &ticket).await;
    session.apply_generation(ticket.token, outcome);
    session.save_and_continue().unwrap();

    let StepState::Subscribe { twin, .. } = session.state() else {
        panic!("expected Subscribe");
    };
    let reference = twin.gallery.images()[0].as_uri().to_string();

    let err = session.begin_recompose(&reference).unwrap_err();
    assert_eq!(
        err.to_string(),
        "You need 10 coins to recreate. Please purchase more."
    );
    assert_eq!(session.balance(), 5, "nothing was debited");
    assert!(matches!(
        session.state(),
        StepState::Subscribe {
            recompose: RecomposeSlot::Failed(_),
            ..
        }
    ));

    // A purchase clears the failure and unblocks the action.
    session.purchase(CoinPack::Starter).unwrap();
    assert_eq!(session.balance(), 25);
    let ticket = session.begin_recompose(&reference).unwrap();
    let outcome = pipeline::run_recompose(&client, &ticket).await;
    session.apply_recompose(ticket.token, outcome);
    assert_eq!(session.balance(), 15);
}
