//! Router dispatch scenarios against scripted providers.

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{answer, ScriptedProvider};
use niveshak::error::LlmError;
use niveshak::llm::{ChatOptions, Message, Provider, Router, RouterConfig};

fn fast_config() -> RouterConfig {
    RouterConfig {
        max_retries: 2,
        retry_base_delay: Duration::from_millis(1),
        complexity_models: Default::default(),
    }
}

fn provider_down(name: &str) -> LlmError {
    LlmError::ProviderDown { provider: name.into(), message: "502 bad gateway".into() }
}

#[tokio::test]
async fn fallback_to_backup_provider() {
    let primary = ScriptedProvider::new(
        "primary",
        vec![Err(provider_down("primary")), Err(provider_down("primary"))],
    );
    let backup = ScriptedProvider::new("backup", vec![Ok(answer("backup", "from backup"))]);
    let router = Router::new(primary.clone(), vec![backup.clone()], fast_config());

    let ctx = CancellationToken::new();
    let response = router
        .chat(&ctx, &[Message::user("hello")], &[], &ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(response.content, "from backup");
    assert_eq!(response.provider, "backup");
    // Primary consumed its configured retries before the chain moved on.
    assert_eq!(primary.call_count(), 2);
    assert_eq!(backup.call_count(), 1);
}

#[tokio::test]
async fn non_retryable_error_stops_the_chain() {
    let primary = ScriptedProvider::new(
        "primary",
        vec![Err(LlmError::NoApiKey { provider: "primary".into() })],
    );
    let backup = ScriptedProvider::new("backup", vec![Ok(answer("backup", "unused"))]);
    let router = Router::new(primary.clone(), vec![backup.clone()], fast_config());

    let ctx = CancellationToken::new();
    let err = router
        .chat(&ctx, &[Message::user("hello")], &[], &ChatOptions::default())
        .await
        .unwrap_err();

    // One call, no retries, no fallback, error surfaced unchanged.
    assert!(matches!(err, LlmError::NoApiKey { .. }));
    assert_eq!(primary.call_count(), 1);
    assert_eq!(backup.call_count(), 0);
}

#[tokio::test]
async fn context_length_and_invalid_model_also_short_circuit() {
    for error in [
        LlmError::ContextLength("too long".into()),
        LlmError::InvalidModel { provider: "primary".into(), model: "gpt-99".into() },
    ] {
        let primary = ScriptedProvider::new("primary", vec![Err(error)]);
        let backup = ScriptedProvider::new("backup", vec![]);
        let router = Router::new(primary.clone(), vec![backup.clone()], fast_config());

        let ctx = CancellationToken::new();
        let _ = router
            .chat(&ctx, &[Message::user("x")], &[], &ChatOptions::default())
            .await
            .unwrap_err();
        assert_eq!(primary.call_count(), 1);
        assert_eq!(backup.call_count(), 0);
    }
}

#[tokio::test]
async fn exhausted_chain_reports_all_providers_failed() {
    let primary = ScriptedProvider::new(
        "primary",
        vec![Err(provider_down("primary")), Err(provider_down("primary"))],
    );
    let backup = ScriptedProvider::new(
        "backup",
        vec![Err(provider_down("backup")), Err(provider_down("backup"))],
    );
    let router = Router::new(primary, vec![backup], fast_config());

    let ctx = CancellationToken::new();
    let err = router
        .chat(&ctx, &[Message::user("x")], &[], &ChatOptions::default())
        .await
        .unwrap_err();

    let LlmError::AllProvidersFailed { last } = err else {
        panic!("expected AllProvidersFailed, got {err:?}");
    };
    assert!(matches!(*last, LlmError::ProviderDown { .. }));
}

#[tokio::test]
async fn router_identity_and_health() {
    let primary = ScriptedProvider::new("primary", vec![]);
    let backup = ScriptedProvider::new("backup", vec![]);
    let router = Router::new(primary, vec![backup], fast_config());

    assert_eq!(router.name(), "router/primary");
    let models = router.models();
    assert!(models.contains(&"primary-model".to_string()));
    assert!(models.contains(&"backup-model".to_string()));

    let ctx = CancellationToken::new();
    let health = router.health_check(&ctx).await;
    assert_eq!(health.len(), 2);
    assert!(health.values().all(|status| status.is_none()));
}
