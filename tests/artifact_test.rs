//! Local artifact storage, verification and image retry policy.

use std::time::Duration;
use uuid::Uuid;

use leadpress::error::Error;
use leadpress::model::work::{ImageSlot, WorkId};
use leadpress::stage::images::{image_key, verify_artifact};
use leadpress::stage::{ArtifactStore, LocalArtifactStore, RetryPolicy};

const BASE: &str = "https://cdn.test/artifacts";

fn store() -> LocalArtifactStore {
    let root = std::env::temp_dir().join(format!("leadpress-artifacts-{}", Uuid::new_v4()));
    LocalArtifactStore::new(root, format!("{BASE}/"))
}

#[tokio::test]
async fn put_then_verify() {
    let store = store();
    let url = store.put("images/a/1-featured.png", b"\x89PNGdata").await.unwrap();
    assert_eq!(url, format!("{BASE}/images/a/1-featured.png"));
    assert_eq!(verify_artifact(&store, &url).await.unwrap(), 8);
}

#[tokio::test]
async fn zero_byte_artifact_fails_verification() {
    let store = store();
    let url = store.put("images/a/2-ingredients.png", b"").await.unwrap();
    let err = verify_artifact(&store, &url).await.unwrap_err();
    assert!(matches!(err, Error::Verification(ref m) if m.contains("zero bytes")), "{err:?}");
}

#[tokio::test]
async fn missing_or_foreign_urls_are_not_found() {
    let store = store();
    assert_eq!(store.size(&format!("{BASE}/images/nope.png")).await.unwrap(), None);
    assert_eq!(store.size("https://elsewhere.test/x.png").await.unwrap(), None);
    assert_eq!(store.size(&format!("{BASE}/../etc/passwd")).await.unwrap(), None);

    let err = verify_artifact(&store, "https://elsewhere.test/x.png")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Verification(ref m) if m.contains("missing")), "{err:?}");
}

#[test]
fn image_keys_follow_slot_and_format() {
    let id = WorkId::new();
    let png = image_key(id, ImageSlot::Featured, &[0x89, b'P', b'N', b'G', 0, 0]);
    assert_eq!(png, format!("images/{}/1-featured.png", id.0));

    let jpg = image_key(id, ImageSlot::Serving, &[0xFF, 0xD8, 0xFF, 0xE0]);
    assert_eq!(jpg, format!("images/{}/4-serving.jpg", id.0));

    let webp = image_key(id, ImageSlot::Process, b"RIFF\0\0\0\0WEBPVP8 ");
    assert!(webp.ends_with("3-process.webp"), "{webp}");

    let unknown = image_key(id, ImageSlot::Ingredients, b"??");
    assert!(unknown.ends_with("2-ingredients.bin"), "{unknown}");
}

#[test]
fn backoff_doubles_up_to_cap() {
    let policy = RetryPolicy {
        max_attempts: 5,
        initial_backoff: Duration::from_secs(5),
        max_backoff: Duration::from_secs(30),
    };
    let waits: Vec<u64> = (1..=5).map(|a| policy.backoff(a).as_secs()).collect();
    assert_eq!(waits, vec![5, 10, 20, 30, 30]);
}

#[test]
fn retry_policy_from_settings_has_at_least_one_attempt() {
    let settings = leadpress::config::settings::ImageSettings {
        max_attempts: 0,
        initial_backoff_secs: 1,
        max_backoff_secs: 2,
    };
    let policy = RetryPolicy::from(&settings);
    assert_eq!(policy.max_attempts, 1);
    assert_eq!(policy.max_backoff, Duration::from_secs(2));
}
