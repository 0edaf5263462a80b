use crate::config::{Settings, UserEntry};
use crate::error::{DashboardError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
#[cfg(feature = "web")]
use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use subtle::ConstantTimeEq;
use uuid::Uuid;

#[cfg(feature = "web")]
use crate::app::AppState;

/// Server-side lifetime of a session when the cookie itself has no expiry.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);
/// Cookie name used when no authenticator config provides one.
pub const DEFAULT_COOKIE_NAME: &str = "dashboard_session";

const COOKIE_KEY_SALT: &[u8] = b"team-dashboard-cookie";

/// The authenticated user
///
/// `username` selects the team's data source; `name` is what the welcome
/// banner shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub name: String,
}

/// Login form data
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Credential checks
// ---------------------------------------------------------------------------

/// Where credentials are checked against
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// Plaintext `username → password` pairs from the secrets file.
    Secrets(HashMap<String, String>),
    /// Hashed credentials from the authenticator config.
    Credentials(HashMap<String, UserEntry>),
}

impl Authenticator {
    /// Hashed credentials win when an authenticator config is present.
    pub fn from_settings(settings: &Settings) -> Self {
        match &settings.authenticator {
            Some(config) => Authenticator::Credentials(config.credentials.usernames.clone()),
            None => Authenticator::Secrets(settings.secrets.passwords.clone()),
        }
    }

    /// Check a username/password pair
    ///
    /// # Returns
    /// * `Ok(Some(identity))` - credentials match
    /// * `Ok(None)` - unknown user or wrong password
    ///
    /// # Errors
    /// * Returns an error if a stored hash cannot be parsed
    pub fn verify(&self, username: &str, password: &str) -> Result<Option<Identity>> {
        match self {
            Authenticator::Secrets(passwords) => {
                let matched = passwords
                    .get(username)
                    .is_some_and(|stored| constant_time_eq(password, stored));
                Ok(matched.then(|| Identity {
                    username: username.to_string(),
                    name: username.to_string(),
                }))
            }
            Authenticator::Credentials(users) => {
                let Some(user) = users.get(username) else {
                    return Ok(None);
                };
                let matched = verify_password(password, &user.password)?;
                Ok(matched.then(|| Identity {
                    username: username.to_string(),
                    name: user.name.clone(),
                }))
            }
        }
    }
}

/// Compare two secrets without an early exit on the first differing byte.
pub fn constant_time_eq(given: &str, stored: &str) -> bool {
    bool::from(given.as_bytes().ct_eq(stored.as_bytes()))
}

/// Hash a password using Argon2
///
/// Creates an Argon2id PHC string with a random salt, suitable for the
/// `password` field of the authenticator config.
///
/// # Errors
/// * Returns an error if the password hashing fails
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DashboardError::Hash(e.to_string()))
}

/// Verify a password against a stored argon2 or bcrypt hash
///
/// # Errors
/// * Returns an error if the hash is in an invalid format
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    if hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$") {
        return bcrypt::verify(password, hash).map_err(|e| DashboardError::Hash(e.to_string()));
    }

    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| DashboardError::Hash("invalid password hash format".into()))?;

    // a mismatch is an error in the argon2 API, not a failed check
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

// ---------------------------------------------------------------------------
// Per-session authentication state
// ---------------------------------------------------------------------------

/// Result of a login attempt
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated(Identity),
    /// The session was already logged in; the attempt was ignored.
    AlreadyAuthenticated(Identity),
    Rejected,
}

/// Authentication state of one browser session
///
/// `password_correct` is `None` before the first attempt, so the login page
/// can tell a fresh visitor from a failed attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    password_correct: Option<bool>,
    identity: Option<Identity>,
}

impl SessionState {
    pub fn authenticated(identity: Identity) -> Self {
        SessionState {
            password_correct: Some(true),
            identity: Some(identity),
        }
    }

    pub fn check_password(&self) -> bool {
        self.password_correct == Some(true)
    }

    pub fn attempted(&self) -> bool {
        self.password_correct.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Handle a submitted login form
    ///
    /// A session authenticates at most once: after success, later attempts
    /// leave the recorded identity alone. The submitted password is only
    /// borrowed for the check and never kept.
    pub fn password_entered(
        &mut self,
        auth: &Authenticator,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome> {
        if let (true, Some(identity)) = (self.check_password(), &self.identity) {
            return Ok(LoginOutcome::AlreadyAuthenticated(identity.clone()));
        }

        match auth.verify(username, password)? {
            Some(identity) => {
                self.password_correct = Some(true);
                self.identity = Some(identity.clone());
                Ok(LoginOutcome::Authenticated(identity))
            }
            None => {
                self.password_correct = Some(false);
                self.identity = None;
                Ok(LoginOutcome::Rejected)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session storage
// ---------------------------------------------------------------------------

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    pub state: SessionState,
    pub expires_at: SystemTime,
}

/// Authenticated sessions keyed by a random session id
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    duration: Duration,
}

impl SessionStore {
    pub fn new(duration: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            duration,
        }
    }

    /// Store an authenticated session and return its id
    ///
    /// Expired sessions are swept out first.
    pub fn create(&self, state: SessionState) -> String {
        let now = SystemTime::now();
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            state,
            expires_at: now + self.duration,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        // sessions whose cookie never comes back are only dropped here
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);
        session_id
    }

    /// Identity behind a session id, if the session exists and is current
    ///
    /// Expired sessions are dropped on lookup.
    pub fn validate(&self, session_id: &str) -> Option<Identity> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(session_id) {
            Some(session) if session.expires_at > SystemTime::now() => {
                session.state.identity().cloned()
            }
            Some(_) => {
                sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    pub fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Cookie settings
// ---------------------------------------------------------------------------

/// Name, signing key and lifetime of the session cookie
#[cfg(feature = "web")]
#[derive(Clone)]
pub struct CookieSettings {
    pub name: String,
    pub key: Key,
    /// `None` gives a browser-session cookie.
    pub max_age: Option<Duration>,
}

#[cfg(feature = "web")]
impl CookieSettings {
    /// Cookie settings from the authenticator config, or per-process defaults
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match &settings.authenticator {
            Some(config) => Ok(CookieSettings {
                name: config.cookie.name.clone(),
                key: derive_cookie_key(&config.cookie.key)?,
                max_age: config.cookie.expiry(),
            }),
            None => Ok(CookieSettings {
                name: DEFAULT_COOKIE_NAME.to_string(),
                key: Key::generate(),
                max_age: None,
            }),
        }
    }

    pub fn session_duration(&self) -> Duration {
        self.max_age.unwrap_or(DEFAULT_SESSION_DURATION)
    }

    fn session_cookie(&self, session_id: String) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.name.clone(), session_id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        if let Some(max_age) = self.max_age {
            cookie.set_max_age(time::Duration::seconds(max_age.as_secs() as i64));
        }
        cookie
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), "")).path("/").build()
    }
}

/// Stretch a configured cookie secret of any length into a signing key.
#[cfg(feature = "web")]
pub fn derive_cookie_key(secret: &str) -> Result<Key> {
    let mut material = [0u8; 64];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), COOKIE_KEY_SALT, &mut material)
        .map_err(|e| DashboardError::Hash(e.to_string()))?;
    Key::try_from(&material[..]).map_err(|e| DashboardError::Hash(e.to_string()))
}

// Web handler functions below (only compiled with "web" feature)

/// Which banner the login page shows
#[cfg(feature = "web")]
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub failed: bool,
}

#[cfg(feature = "web")]
fn current_identity(state: &AppState, jar: &SignedCookieJar) -> Option<(String, Identity)> {
    let cookie = jar.get(&state.cookie.name)?;
    let session_id = cookie.value().to_string();
    state
        .sessions
        .validate(&session_id)
        .map(|identity| (session_id, identity))
}

/// Serve the login page
///
/// A visitor that is already logged in goes straight to the dashboard.
#[cfg(feature = "web")]
pub async fn serve_login_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    if current_identity(&state, &jar).is_some() {
        return Redirect::to("/").into_response();
    }

    let message = if query.failed {
        r#"<div class="alert error">😕 User not known or password incorrect</div>"#
    } else {
        r#"<div class="alert warning">Please enter your username and password</div>"#
    };

    Html(include_str!("./static/login.html").replace("{{message}}", message)).into_response()
}

/// Handle user login requests
///
/// Validates credentials and, on success, creates a session and sets the
/// signed session cookie. A session that is already authenticated is sent
/// to the dashboard without checking the form again.
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    if current_identity(&state, &jar).is_some() {
        return Redirect::to("/").into_response();
    }

    let mut session = SessionState::default();
    match session.password_entered(&state.auth, &credentials.username, &credentials.password) {
        Ok(LoginOutcome::Authenticated(identity))
        | Ok(LoginOutcome::AlreadyAuthenticated(identity)) => {
            log::info!("user {} logged in", identity.username);
            let session_id = state.sessions.create(session);
            (jar.add(state.cookie.session_cookie(session_id)), Redirect::to("/")).into_response()
        }
        Ok(LoginOutcome::Rejected) => {
            log::warn!("rejected login for {}", credentials.username);
            Redirect::to("/login?failed=true").into_response()
        }
        Err(e) => {
            log::error!("authentication error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error").into_response()
        }
    }
}

/// Handle user logout
///
/// Forgets the server-side session, clears the cookie and returns to the
/// login page.
#[cfg(feature = "web")]
pub async fn handle_logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> (SignedCookieJar, Redirect) {
    if let Some((session_id, identity)) = current_identity(&state, &jar) {
        state.sessions.remove(&session_id);
        log::info!("user {} logged out", identity.username);
    }
    (jar.remove(state.cookie.removal_cookie()), Redirect::to("/login"))
}

/// Authentication middleware
///
/// Lets requests with a valid session through, with the [`Identity`] in the
/// request extensions. Anything else is blocked: API calls get 401, pages
/// are redirected to the login form.
#[cfg(feature = "web")]
pub async fn require_auth(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some((_, identity)) = current_identity(&state, &jar) {
        request.extensions_mut().insert(identity);
        return next.run(request).await;
    }

    if request.uri().path().starts_with("/api/") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "status": "error",
                "message": "Please enter your username and password",
            })),
        )
            .into_response();
    }

    Redirect::to("/login").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets_auth() -> Authenticator {
        let mut passwords = HashMap::new();
        passwords.insert("udemontreal".to_string(), "bleus".to_string());
        passwords.insert("sherbrooke".to_string(), "vert-et-or".to_string());
        Authenticator::Secrets(passwords)
    }

    fn hashed_auth() -> Authenticator {
        let mut users = HashMap::new();
        users.insert(
            "sherbrooke".to_string(),
            UserEntry {
                name: "Sherbrooke".to_string(),
                email: String::new(),
                password: hash_password("vert-et-or").unwrap(),
            },
        );
        Authenticator::Credentials(users)
    }

    #[test]
    fn matching_secret_authenticates_once() {
        let auth = secrets_auth();
        let mut session = SessionState::default();
        assert!(!session.attempted());

        let outcome = session.password_entered(&auth, "sherbrooke", "vert-et-or").unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(ref id) if id.username == "sherbrooke"));
        assert!(session.check_password());
        assert_eq!(session.identity().unwrap().username, "sherbrooke");

        // a second, different valid login does not replace the identity
        let again = session.password_entered(&auth, "udemontreal", "bleus").unwrap();
        assert!(matches!(again, LoginOutcome::AlreadyAuthenticated(ref id) if id.username == "sherbrooke"));
        assert_eq!(session.identity().unwrap().username, "sherbrooke");
    }

    #[test]
    fn wrong_password_sets_no_identity() {
        let auth = secrets_auth();
        let mut session = SessionState::default();
        for (user, pass) in [("sherbrooke", "bleus"), ("mcgill", "bleus"), ("sherbrooke", "")] {
            let outcome = session.password_entered(&auth, user, pass).unwrap();
            assert_eq!(outcome, LoginOutcome::Rejected);
            assert!(session.attempted());
            assert!(!session.check_password());
            assert!(session.identity().is_none());
        }
    }

    #[test]
    fn hashed_credentials_use_display_name() {
        let auth = hashed_auth();
        let identity = auth.verify("sherbrooke", "vert-et-or").unwrap().unwrap();
        assert_eq!(identity.name, "Sherbrooke");
        assert!(auth.verify("sherbrooke", "wrong").unwrap().is_none());
    }

    #[test]
    fn bcrypt_hashes_are_accepted() {
        let hash = bcrypt::hash("abc", 4).unwrap();
        assert!(verify_password("abc", &hash).unwrap());
        assert!(!verify_password("abd", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(matches!(
            verify_password("abc", "not-a-hash"),
            Err(DashboardError::Hash(_))
        ));
    }

    #[test]
    fn constant_time_eq_requires_exact_match() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secreT"));
        assert!(!constant_time_eq("secret", "secret "));
    }

    #[test]
    fn session_store_round_trip_and_expiry() {
        let identity = Identity {
            username: "sherbrooke".into(),
            name: "Sherbrooke".into(),
        };
        let store = SessionStore::new(DEFAULT_SESSION_DURATION);
        let id = store.create(SessionState::authenticated(identity.clone()));
        assert_eq!(store.validate(&id), Some(identity.clone()));
        assert_eq!(store.validate("nope"), None);

        store.remove(&id);
        assert!(store.is_empty());

        let expired = SessionStore::new(Duration::ZERO);
        let id = expired.create(SessionState::authenticated(identity));
        assert_eq!(expired.validate(&id), None);
        assert!(expired.is_empty());
    }

    #[test]
    fn abandoned_sessions_are_swept_on_create() {
        let identity = Identity {
            username: "sherbrooke".into(),
            name: "Sherbrooke".into(),
        };
        let store = SessionStore::new(Duration::ZERO);
        for _ in 0..1000 {
            store.create(SessionState::authenticated(identity.clone()));
        }
        assert!(store.len() <= 1);
    }

    #[cfg(feature = "web")]
    #[test]
    fn cookie_key_derivation_is_deterministic() {
        let a = derive_cookie_key("some_signature_key").unwrap();
        let b = derive_cookie_key("some_signature_key").unwrap();
        let c = derive_cookie_key("other").unwrap();
        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
    }
}
