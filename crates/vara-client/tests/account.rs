mod common;

use common::MockServer;
use vara_client::api::ApiClient;
use vara_client::billing::Billing;
use vara_client::catalog::Catalog;
use vara_client::error::ClientError;
use vara_client::recommend::{self, Assistant};
use vara_client::session::Session;
use vara_proto::model::PaymentConfirmation;

fn api(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.backend()).unwrap()
}

#[tokio::test]
async fn probe_without_session_is_logged_out() {
    let server = MockServer::start().await;
    let session = Session::new(api(&server));

    assert_eq!(session.probe().await, None);
    assert_eq!(server.mock.hits("user"), 1);
}

#[tokio::test]
async fn probe_with_session_returns_user_and_favourites() {
    let server = MockServer::start().await;
    server.mock.set(|s| {
        s.logged_in = true;
        s.premium = true;
    });
    let session = Session::new(api(&server));

    let user = session.probe().await.expect("logged in");
    assert_eq!(user.email, "asha@example.com");
    assert!(user.has_active_premium(chrono::Utc::now()));
    assert_eq!(user.plan_label(), "premium");

    assert_eq!(session.load_favorites().await.unwrap(), vec!["s1".to_string()]);
}

#[tokio::test]
async fn favourites_round_trip_and_failures() {
    let server = MockServer::start().await;
    server.mock.set(|s| s.logged_in = true);
    let session = Session::new(api(&server));

    session.add_favorite("s2").await.unwrap();
    session.remove_favorite("s2").await.unwrap();
    assert_eq!(server.mock.bodies("/api/user/favorites")[0]["songId"], "s2");

    server.mock.set(|s| s.fail_favorites = true);
    assert!(session.add_favorite("s3").await.is_err());

    server.mock.set(|s| s.logged_in = false);
    assert_eq!(session.load_favorites().await.unwrap_err(), ClientError::Unauthorized);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let server = MockServer::start().await;
    server.mock.set(|s| s.logged_in = true);
    let session = Session::new(api(&server));

    session.logout().await;
    assert_eq!(server.mock.hits("logout"), 1);
    assert_eq!(session.probe().await, None);
    assert!(session.login_url().ends_with("/api/auth/google"));
}

#[tokio::test]
async fn youtube_link_is_validated_before_sending() {
    let server = MockServer::start().await;
    server.mock.set(|s| s.logged_in = true);
    let session = Session::new(api(&server));

    let err = session
        .update_youtube_channel("https://vimeo.com/asha")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(server.mock.hits("youtube"), 0);

    session
        .update_youtube_channel(" https://www.youtube.com/@asha ")
        .await
        .unwrap();
    let bodies = server.mock.bodies("/api/user/youtube-channel");
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["link"], "https://www.youtube.com/@asha");
}

#[tokio::test]
async fn purchase_flow() {
    let server = MockServer::start().await;
    server.mock.set(|s| s.logged_in = true);
    let billing = Billing::new(api(&server));

    let plans = billing.plans().await.unwrap();
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].currency, "INR");

    let order = billing.create_order("monthly").await.unwrap();
    assert_eq!(order.order_id, "order_1");
    assert!(!order.simulated);
    assert_eq!(server.mock.bodies("/api/billing/order")[0]["planId"], "monthly");

    let wrong = PaymentConfirmation {
        order_id: "order_2".into(),
        payment_id: "pay_1".into(),
        signature: "sig".into(),
    };
    assert!(matches!(
        billing.confirm(&order, &wrong).await,
        Err(ClientError::Validation(_))
    ));
    assert_eq!(server.mock.hits("payment_verify"), 0);

    let payment = PaymentConfirmation {
        order_id: "order_1".into(),
        ..wrong
    };
    billing.confirm(&order, &payment).await.unwrap();
    let sent = &server.mock.bodies("/api/billing/verify")[0];
    assert_eq!(sent["orderId"], "order_1");
    assert_eq!(sent["paymentId"], "pay_1");

    let session = Session::new(api(&server));
    assert!(session.probe().await.unwrap().is_premium);
}

#[tokio::test]
async fn blank_plan_is_rejected_locally() {
    let server = MockServer::start().await;
    let billing = Billing::new(api(&server));

    assert!(matches!(
        billing.create_order(" ").await,
        Err(ClientError::Validation(_))
    ));
    assert_eq!(server.mock.hits("order"), 0);

    billing.simulate("yearly").await.unwrap();
    assert_eq!(server.mock.bodies("/api/billing/simulate")[0]["planId"], "yearly");
}

#[tokio::test]
async fn assistant_resolves_known_songs() {
    let server = MockServer::start().await;
    server.mock.set(|s| s.logged_in = true);
    let api = api(&server);
    let data = Catalog::new(&api, 10).load_all().await;
    let assistant = Assistant::new(api);

    let rec = assistant.recommend("  calm sitar  ").await.unwrap();
    assert_eq!(server.mock.bodies("/api/ai/recommend")[0]["prompt"], "calm sitar");

    let resolved = recommend::resolve(&rec, &data);
    assert_eq!(resolved.message, "Try these");
    let ids: Vec<_> = resolved.songs.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["s2", "s1"]);
}

#[tokio::test]
async fn assistant_quota_and_blank_prompt() {
    let server = MockServer::start().await;
    let assistant = Assistant::new(api(&server));

    assert!(matches!(
        assistant.recommend("   ").await,
        Err(ClientError::Validation(_))
    ));
    assert_eq!(server.mock.hits("recommend"), 0);

    server.mock.set(|s| s.recommend_quota = true);
    let err = assistant.recommend("focus music").await.unwrap_err();
    assert_eq!(
        err,
        ClientError::QuotaExceeded {
            message: Some("Daily limit reached".into())
        }
    );
}
