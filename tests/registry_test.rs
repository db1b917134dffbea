use std::sync::Arc;
use std::time::Duration;

use rmbg_rs::mocks::MockModelSource;
use rmbg_rs::{ModelRegistry, ModelSpec, RegistryStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_load() {
    let source = MockModelSource::new().with_delay(Duration::from_millis(200));
    let registry = Arc::new(ModelRegistry::new(source.clone(), ModelSpec::rmbg()));

    let handles = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.acquire().await })
        })
        .collect::<Vec<_>>();

    let mut loaded = Vec::with_capacity(handles.len());
    for handle in handles {
        loaded.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(source.load_attempts(), 1);
    assert!(loaded.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(registry.status(), RegistryStatus::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_failure() {
    let source = MockModelSource::new()
        .failing_first(1)
        .with_delay(Duration::from_millis(200));
    let registry = Arc::new(ModelRegistry::new(source.clone(), ModelSpec::rmbg()));

    let handles = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.ensure_ready().await })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_load());
    }
    assert_eq!(source.load_attempts(), 1);
    assert_eq!(registry.status(), RegistryStatus::Failed);
}

#[tokio::test]
async fn test_two_failures_then_success() {
    let source = MockModelSource::new().failing_first(2);
    let registry = ModelRegistry::new(source.clone(), ModelSpec::rmbg());

    assert!(registry.ensure_ready().await.unwrap_err().is_load());
    assert_eq!(registry.status(), RegistryStatus::Failed);
    assert!(registry.ensure_ready().await.unwrap_err().is_load());
    assert_eq!(source.load_attempts(), 2);

    registry.ensure_ready().await.unwrap();
    assert_eq!(source.load_attempts(), 3);
    assert_eq!(registry.status(), RegistryStatus::Ready);

    registry.ensure_ready().await.unwrap();
    assert_eq!(source.load_attempts(), 3);
}

#[tokio::test]
async fn test_load_error_reports_model_and_cause() {
    let source = MockModelSource::new().failing_first(1);
    let registry = ModelRegistry::new(source, ModelSpec::rmbg());

    let err = registry.ensure_ready().await.unwrap_err();

    assert_eq!(err.to_string(), "Failed to load model briaai/RMBG-1.4");
    let cause = std::error::Error::source(&err).map(ToString::to_string);
    assert_eq!(cause.as_deref(), Some("Model error: weights download failed"));
}
