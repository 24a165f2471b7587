//! Scenario 4 from spec §8: PO token rejected by the server.

mod common;

use sabr_stream::proto::FormatId;
use sabr_stream::sabr::{Event, PoTokenStatusKind};
use sabr_stream::{FormatSelector, SabrSession, SabrSessionConfig};

#[tokio::test]
async fn attestation_required_fails_after_the_retry_budget_is_spent() {
    let sps = common::ump_part(common::tag::STREAM_PROTECTION_STATUS, &common::stream_protection_status(3, 2));
    let addr = common::spawn_mock_server(vec![sps.clone(), sps.clone(), sps]).await;

    let config = SabrSessionConfig::new(common::mock_url(addr, ""))
        .with_audio_selection(FormatSelector::Audio { ids: vec![FormatId { itag: Some(140), lmt: None, xtags: None }], discard_media: false })
        .with_po_token(b"a-po-token".to_vec());
    let mut session = SabrSession::new(config, reqwest::Client::new()).unwrap();

    let first = session.next_events().await.unwrap();
    assert!(matches!(first.as_slice(), [Event::PoTokenStatus { status: PoTokenStatusKind::Invalid }]));

    let second = session.next_events().await.unwrap();
    assert!(matches!(second.as_slice(), [Event::PoTokenStatus { status: PoTokenStatusKind::Invalid }]));

    let third = session.next_events().await;
    let err = third.expect_err("third attestation failure should terminate the session");
    assert!(err.to_string().contains("Attestation Required"));
    assert!(err.to_string().contains("Invalid PO Token"));
}
