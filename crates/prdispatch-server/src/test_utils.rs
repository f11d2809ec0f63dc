//! Test utilities for prdispatch-server integration tests.

use std::sync::Arc;

use axum::Router;
use prdispatch_core::db::{
    DbPool, create_pool, run_migrations,
    sessions::SessionRepo,
    users::{ProviderAuthorizationRepo, UserRepo},
};
use prdispatch_core::models::{ProviderUser, User};
use prdispatch_core::testing::{
    FAKE_PROVIDER_USER_ID, FakeOAuth, FakeProvider, FakeProviderFactory, RecordingSubmitter,
    repository, test_encryption_key,
};
use url::Url;

use crate::state::{AppState, Integration, ServerConfig};

/// Public origin of the test server.
pub const TEST_BASE_URL: &str = "http://localhost:8080";

/// Login of the user the fake provider authenticates.
pub const TEST_LOGIN: &str = "octocat";

/// Code the fake OAuth flow accepts.
pub const TEST_OAUTH_CODE: &str = "test-oauth-code";

/// Access token the fake OAuth flow issues.
pub const TEST_ACCESS_TOKEN: &str = "gho_test_access_token";

/// Handles on the fakes behind a test app.
pub struct TestContext {
    pub db: DbPool,
    pub provider: Arc<FakeProvider>,
    pub providers: Arc<FakeProviderFactory>,
    pub submitter: Arc<RecordingSubmitter>,
}

/// Creates an in-memory test database with migrations applied.
pub async fn setup_test_db() -> DbPool {
    let pool = create_pool("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Server configuration for tests (dev mode, plain HTTP).
pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        base_url: TEST_BASE_URL.to_string(),
        base_url_parsed: Url::parse(TEST_BASE_URL).expect("valid test URL"),
        bind: "127.0.0.1:0".to_string(),
        database_url: "sqlite::memory:".to_string(),
        dev_mode: true,
    }
}

/// A provider where the test user administers two repositories, has one
/// fork and can only read a third.
pub fn default_test_provider() -> FakeProvider {
    FakeProvider::new(TEST_LOGIN)
        .with_repo(repository("octocat/widgets", true, false))
        .with_repo(repository("octocat/gadgets", true, false))
        .with_repo(repository("octocat/forked", true, true))
        .with_repo(repository("someone/read-only", false, false))
}

/// Creates the full app around `provider` with a recording submitter.
pub async fn create_test_app_with_provider(provider: FakeProvider) -> (Router, TestContext) {
    let db = setup_test_db().await;
    let provider = Arc::new(provider);
    let providers = Arc::new(FakeProviderFactory::new(provider.clone()));
    let submitter = Arc::new(RecordingSubmitter::new());

    let integration = Integration {
        encryption_key: test_encryption_key(),
        providers: providers.clone(),
        oauth: Arc::new(FakeOAuth::new(TEST_OAUTH_CODE, TEST_ACCESS_TOKEN)),
        submitter: submitter.clone(),
    };

    let state = AppState::new(db.clone(), test_server_config(), Some(integration));
    let app = crate::build_router(state);

    (
        app,
        TestContext {
            db,
            provider,
            providers,
            submitter,
        },
    )
}

/// Creates the full app with [`default_test_provider`].
pub async fn create_test_app() -> (Router, TestContext) {
    create_test_app_with_provider(default_test_provider()).await
}

/// Creates an app with the integration disabled.
pub async fn create_disabled_test_app() -> Router {
    let db = setup_test_db().await;
    crate::build_router(AppState::new(db, test_server_config(), None))
}

/// Signs in the test user directly, returning the user and a session token.
pub async fn login_test_user(ctx: &TestContext) -> (User, String) {
    let provider_user = ProviderUser {
        id: FAKE_PROVIDER_USER_ID,
        login: TEST_LOGIN.to_string(),
    };
    let user = UserRepo::upsert_provider_user(&ctx.db, &provider_user)
        .await
        .expect("Failed to create user");
    ProviderAuthorizationRepo::store(
        &ctx.db,
        &test_encryption_key(),
        user.id,
        TEST_ACCESS_TOKEN,
        None,
    )
    .await
    .expect("Failed to store authorization");
    let token = SessionRepo::create(&ctx.db, user.id)
        .await
        .expect("Failed to create session");
    (user, token)
}

/// `Cookie` header value carrying a session token.
pub fn session_cookie_header(token: &str) -> String {
    format!("{}={}", crate::middleware::SESSION_COOKIE, token)
}
