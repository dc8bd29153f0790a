//! Command-line Lightning key login.
//!
//! Answers an LNURL-auth challenge, or verifies a node through its signing
//! device, then prints the resulting session as JSON on stdout. Logs go to
//! stderr and never include the session token.
//!
//! # Configuration
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `LNAUTH_DEPLOYMENT` | `production` (default) or `sandbox` |
//! | `LNAUTH_API_URL` | overrides the deployment's API base URL |
//! | `LNAUTH_STORE` | JSON file for the identity key and client id (in-memory if unset) |
//! | `LNAUTH_SEED` | derive the identity key from this seed instead of the store |
//! | `LNAUTH_CHALLENGE` | `LNURL1...` token to answer |
//! | `LNAUTH_DEVICE_URL` | signing device base URL (node verification) |
//! | `LNAUTH_DEVICE_TOKEN` | device admin token |
//! | `LNAUTH_CHALLENGE_ID` | verifier challenge id |
//! | `LNAUTH_TIMEOUT_SECS` | bound on the whole login, default 120 |
//!
//! With neither `LNAUTH_CHALLENGE` nor `LNAUTH_DEVICE_URL` set, prints the
//! identity public key and realtime client id.
//!
//! ```bash
//! export LNAUTH_STORE=~/.lnauth.json
//! export LNAUTH_CHALLENGE=LNURL1DP68GURN8GHJ7...
//! RUST_LOG=info cargo run --release -p lnauth-cli
//! ```

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use config::Deployment;
use sdk::SessionContext;
use signer::{DeterministicSeedKeySource, KeySource, PersistedSecureKeySource};
use storage::{FileStore, InMemoryStore, LocalStore};
use transport::{
    NoopObserver, ReqwestTransport, Session, SubmitOutcome, TungsteniteFactory, VerificationState,
};
use url::Url;

type Context = SessionContext<ReqwestTransport, TungsteniteFactory, Arc<dyn LocalStore>>;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    let deployment = resolve_deployment()?;
    let timeout = Duration::from_secs(match optional_env("LNAUTH_TIMEOUT_SECS") {
        Some(raw) => raw
            .parse()
            .map_err(|e| format!("LNAUTH_TIMEOUT_SECS is not a number of seconds: {e}"))?,
        None => DEFAULT_TIMEOUT_SECS,
    });

    let store: Arc<dyn LocalStore> = match optional_env("LNAUTH_STORE") {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => {
            tracing::warn!("LNAUTH_STORE unset, identity and client id will not persist");
            Arc::new(InMemoryStore::new())
        }
    };

    let keys: Box<dyn KeySource> = match optional_env("LNAUTH_SEED") {
        Some(seed) => {
            tracing::warn!("using seed-derived identity key");
            Box::new(DeterministicSeedKeySource::new(seed))
        }
        None => Box::new(PersistedSecureKeySource::new(Arc::clone(&store))),
    };

    tracing::info!(
        deployment = deployment.name,
        api_url = deployment.api_url,
        timeout_secs = timeout.as_secs(),
        "lnauth starting"
    );

    let ctx: Context = SessionContext::with_network(
        deployment,
        store,
        Some(timeout),
        Arc::new(NoopObserver),
    )?;

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    let login = async {
        if let Some(challenge) = optional_env("LNAUTH_CHALLENGE") {
            lnurl_login(&ctx, &challenge, keys.as_ref()).await.map(Some)
        } else if let Some(device_url) = optional_env("LNAUTH_DEVICE_URL") {
            verify_node(&ctx, &device_url).await.map(Some)
        } else {
            show_identity(&ctx, keys.as_ref()).map(|()| None)
        }
    };

    let result = tokio::select! {
        result = tokio::time::timeout(timeout, login) => match result {
            Ok(inner) => inner,
            Err(_) => Err(format!("login did not complete within {}s", timeout.as_secs()).into()),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            Ok(None)
        }
    };

    ctx.shutdown();

    if let Some(session) = result? {
        print_session(&session)?;
    }
    tracing::info!("lnauth stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

async fn lnurl_login(
    ctx: &Context,
    challenge: &str,
    keys: &dyn KeySource,
) -> Result<Session, Box<dyn Error>> {
    match ctx.login_with_challenge(challenge, keys).await? {
        SubmitOutcome::Accepted => {}
        SubmitOutcome::Rejected { status, reason } => {
            return Err(format!("challenge rejected ({status}): {reason}").into());
        }
    }

    tracing::info!("waiting for the backend to confirm the login");
    Ok(ctx.wait_for_session().await?)
}

async fn verify_node(ctx: &Context, device_url: &str) -> Result<Session, Box<dyn Error>> {
    let device_url = Url::parse(device_url).map_err(|e| format!("LNAUTH_DEVICE_URL: {e}"))?;
    let mut saga = ctx.node_verification(
        device_url,
        required_env("LNAUTH_DEVICE_TOKEN")?,
        required_env("LNAUTH_CHALLENGE_ID")?,
    )?;

    match ctx.verify_node(&mut saga).await? {
        VerificationState::Verified(session) => Ok(session),
        VerificationState::Failed { step, reason } => {
            Err(format!("node verification failed at {step}: {reason}").into())
        }
        other => Err(format!("node verification stopped in {other:?}").into()),
    }
}

fn show_identity(ctx: &Context, keys: &dyn KeySource) -> Result<(), Box<dyn Error>> {
    let key_pair = keys.key_pair()?;
    let client_id = ctx.channel().client_id()?;
    tracing::info!(pubkey = %key_pair.public_key_hex(), %client_id, "identity");
    println!(
        "{}",
        serde_json::json!({
            "pubkey": key_pair.public_key_hex(),
            "client_id": client_id,
        })
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_deployment() -> Result<Deployment, Box<dyn Error>> {
    let base = match optional_env("LNAUTH_DEPLOYMENT").as_deref() {
        None | Some("production") => Deployment::PRODUCTION,
        Some("sandbox") => Deployment::SANDBOX,
        Some(other) => return Err(format!("unknown LNAUTH_DEPLOYMENT '{other}'").into()),
    };
    Ok(match optional_env("LNAUTH_API_URL") {
        // Deployment holds `&'static str`; the override lives for the process.
        Some(url) => base.with_api_url(url.leak()),
        None => base,
    })
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn required_env(name: &str) -> Result<String, Box<dyn Error>> {
    optional_env(name).ok_or_else(|| format!("{name} must be set").into())
}

fn print_session(session: &Session) -> Result<(), Box<dyn Error>> {
    tracing::info!(
        pubkey = %session.pubkey,
        alias = session.alias.as_deref().unwrap_or_default(),
        token_len = session.token.len(),
        "logged in"
    );
    let json = serde_json::json!({
        "pubkey": session.pubkey,
        "alias": session.alias,
        "token": session.token,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
