//! Authentication hook for validating player identity.
//!
//! Wayfarer doesn't verify passwords, issue tokens, or send email
//! itself. It defines the [`Authenticator`] trait and calls it when a
//! client sends an auth request. Plug in your account service in
//! production; use [`MemoryAccounts`] in development and tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;
use wayfarer_protocol::{PlayerId, PositionRecord};

use crate::SessionError;

/// Email and password from a login request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// A new-account request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub player_name: String,
}

/// What a successful login hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub player_id: PlayerId,
    pub email: String,
    pub token: String,

    /// Where the player was when they last logged out, or the spawn
    /// point for a first login.
    pub last_position: PositionRecord,
}

/// Validates credentials and manages accounts.
///
/// # Trait bounds
///
/// - `Send + Sync` → shared by every connection task.
/// - `'static` → lives as long as the server.
///
/// Only [`login`](Authenticator::login) is required. Registration and
/// email verification answer "not supported" unless overridden.
///
/// # Example
///
/// ```rust
/// use wayfarer_protocol::PositionRecord;
/// use wayfarer_session::{AuthGrant, Authenticator, Credentials, SessionError};
///
/// /// Lets anyone in, using the email as the player name.
/// struct OpenDoor;
///
/// impl Authenticator for OpenDoor {
///     async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, SessionError> {
///         let player_id = credentials.email.as_str().into();
///         Ok(AuthGrant {
///             last_position: PositionRecord::at(credentials.email.as_str().into(), 0.0, 0.0),
///             player_id,
///             email: credentials.email.clone(),
///             token: "dev".into(),
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Checks credentials and returns the player's identity.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] with a client-facing reason.
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<AuthGrant, SessionError>> + Send;

    /// Creates an account. Returns a client-facing status message.
    fn register(
        &self,
        _registration: &Registration,
    ) -> impl Future<Output = Result<String, SessionError>> + Send {
        async { Err(SessionError::Unsupported("registration")) }
    }

    /// Confirms an email address with the code sent to it.
    fn verify_email(
        &self,
        _email: &str,
        _code: &str,
    ) -> impl Future<Output = Result<String, SessionError>> + Send {
        async { Err(SessionError::Unsupported("email verification")) }
    }
}

/// Lets one authenticator be shared, e.g. with a position store that
/// writes back into the same account service.
impl<T: Authenticator> Authenticator for Arc<T> {
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<AuthGrant, SessionError>> + Send {
        (**self).login(credentials)
    }

    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<String, SessionError>> + Send {
        (**self).register(registration)
    }

    fn verify_email(
        &self,
        email: &str,
        code: &str,
    ) -> impl Future<Output = Result<String, SessionError>> + Send {
        (**self).verify_email(email, code)
    }
}

// ---------------------------------------------------------------------------
// MemoryAccounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Account {
    password: String,
    player_id: PlayerId,
    verified: bool,
    pending_code: Option<String>,
}

#[derive(Debug, Default)]
struct Accounts {
    by_email: HashMap<String, Account>,
    last_positions: HashMap<PlayerId, PositionRecord>,
}

/// In-memory accounts for development and tests.
///
/// Registration issues a six-digit verification code. There is no email
/// delivery: read it back with [`pending_code`](Self::pending_code).
/// Passwords are stored as given. Never use this in production.
#[derive(Debug)]
pub struct MemoryAccounts {
    inner: Mutex<Accounts>,
    spawn: (f32, f32),
}

impl Default for MemoryAccounts {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccounts {
    /// Empty account list; new players spawn at the origin.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Accounts::default()),
            spawn: (0.0, 0.0),
        }
    }

    pub fn with_spawn(mut self, x: f32, y: f32) -> Self {
        self.spawn = (x, y);
        self
    }

    /// Adds an already-verified account.
    pub async fn insert_verified(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        player_name: impl Into<String>,
    ) {
        let account = Account {
            password: password.into(),
            player_id: PlayerId::new(player_name),
            verified: true,
            pending_code: None,
        };
        self.inner.lock().await.by_email.insert(email.into(), account);
    }

    /// The verification code waiting for `email`, if any.
    pub async fn pending_code(&self, email: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.by_email.get(email)?.pending_code.clone()
    }

    /// Remembers where a player logged out, for their next login.
    pub async fn record_last_position(&self, record: PositionRecord) {
        let mut inner = self.inner.lock().await;
        inner
            .last_positions
            .insert(record.player_id.clone(), record);
    }

    pub async fn last_position(&self, player_id: &PlayerId) -> Option<PositionRecord> {
        self.inner.lock().await.last_positions.get(player_id).cloned()
    }
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:06}")
}

impl Authenticator for MemoryAccounts {
    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, SessionError> {
        let inner = self.inner.lock().await;
        let account = inner
            .by_email
            .get(&credentials.email)
            .filter(|a| a.password == credentials.password)
            .ok_or_else(|| SessionError::AuthFailed("invalid email or password".into()))?;
        if !account.verified {
            return Err(SessionError::AuthFailed("email not verified".into()));
        }

        let player_id = account.player_id.clone();
        let last_position = match inner.last_positions.get(&player_id) {
            Some(record) => record.clone(),
            None => PositionRecord::at(player_id.clone(), self.spawn.0, self.spawn.1),
        };

        Ok(AuthGrant {
            player_id,
            email: credentials.email.clone(),
            token: generate_token(),
            last_position,
        })
    }

    async fn register(&self, registration: &Registration) -> Result<String, SessionError> {
        if registration.email.is_empty()
            || registration.password.is_empty()
            || registration.player_name.is_empty()
        {
            return Err(SessionError::AuthFailed(
                "email, password and player name are required".into(),
            ));
        }

        let mut inner = self.inner.lock().await;
        if inner.by_email.contains_key(&registration.email) {
            return Err(SessionError::AuthFailed("email already registered".into()));
        }
        let player_id = PlayerId::new(registration.player_name.as_str());
        if inner.by_email.values().any(|a| a.player_id == player_id) {
            return Err(SessionError::AuthFailed("player name taken".into()));
        }

        let code = generate_code();
        tracing::debug!(email = %registration.email, "verification code issued");
        inner.by_email.insert(
            registration.email.clone(),
            Account {
                password: registration.password.clone(),
                player_id,
                verified: false,
                pending_code: Some(code),
            },
        );
        Ok(format!("verification code sent to {}", registration.email))
    }

    async fn verify_email(&self, email: &str, code: &str) -> Result<String, SessionError> {
        let mut inner = self.inner.lock().await;
        let account = inner
            .by_email
            .get_mut(email)
            .filter(|a| a.pending_code.as_deref() == Some(code))
            .ok_or_else(|| SessionError::AuthFailed("invalid verification code".into()))?;

        account.verified = true;
        account.pending_code = None;
        Ok("email verified".into())
    }
}
