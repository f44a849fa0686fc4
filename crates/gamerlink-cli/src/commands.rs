//! Subcommand implementations. Results go to stdout as JSON, everything else
//! to stderr.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::future::join_all;
use gamerlink_core::{Collection, Error, EventKind, SessionClient, Settings};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

const NOT_LOGGED_IN: &str = "Not logged in. Run `gamerlink login` first.";

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}

fn prompt_email() -> Result<String> {
    eprint!("Email: ");
    io::stderr().flush()?;
    let mut email = String::new();
    io::stdin().lock().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

pub async fn login(client: &SessionClient, mut settings: Settings, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| settings.last_email.clone()) {
        Some(email) => email,
        None => prompt_email()?,
    };
    let password = match std::env::var("GAMERLINK_PASSWORD") {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    let outcome = client.login(&email, &password).await?;

    settings.last_email = Some(email);
    settings.api_root = Some(client.config().api_root.clone());
    if let Err(e) = settings.save() {
        warn!(error = %e, "Failed to save settings");
    }

    print_json(&outcome)
}

pub async fn logout(client: &SessionClient) -> Result<()> {
    client.logout().await;
    eprintln!("Logged out.");
    Ok(())
}

pub async fn status(client: &SessionClient) -> Result<()> {
    if !client.is_logged_in() {
        bail!(NOT_LOGGED_IN);
    }
    match client.get_user().await {
        Some(user) => print_json(&json!({ "loggedIn": true, "user": user })),
        // A network failure leaves the session in place
        None if client.is_logged_in() => {
            bail!("Could not reach the gamerlink backend. The session is kept; try again later.")
        }
        None => bail!("Session is no longer valid. Run `gamerlink login` again."),
    }
}

pub async fn friends(client: &SessionClient, refresh: bool) -> Result<()> {
    let snapshot = if refresh {
        client.refresh_friends().await?
    } else {
        client.get_friends().await
    };
    let snapshot = snapshot.ok_or_else(|| anyhow!(NOT_LOGGED_IN))?;
    for friend in &snapshot.items {
        eprintln!("{:<20} {}", friend.gamertag, friend.presence_display());
    }
    print_json(&snapshot)
}

pub async fn games(client: &SessionClient, refresh: bool) -> Result<()> {
    let snapshot = if refresh {
        client.refresh_games().await?
    } else {
        client.get_games().await
    };
    print_json(&snapshot.ok_or_else(|| anyhow!(NOT_LOGGED_IN))?)
}

pub async fn profile(client: &SessionClient, refresh: bool) -> Result<()> {
    let snapshot = if refresh {
        client.refresh_profile().await?
    } else {
        client.get_profile().await
    };
    print_json(&snapshot.ok_or_else(|| anyhow!(NOT_LOGGED_IN))?)
}

/// Refresh every available collection concurrently
pub async fn sync(client: &SessionClient) -> Result<()> {
    if !client.is_logged_in() {
        bail!(NOT_LOGGED_IN);
    }

    let refreshes = Collection::AVAILABLE.iter().map(|&kind| {
        let client = client.clone();
        async move { (kind, client.refresh_collection::<Value>(kind).await) }
    });

    let mut report = serde_json::Map::new();
    let mut session_lost = false;
    for (kind, result) in join_all(refreshes).await {
        let entry = match result {
            Ok(Some(snapshot)) => json!({ "count": snapshot.count, "lastUpdated": snapshot.last_updated }),
            Ok(None) => json!({ "error": NOT_LOGGED_IN }),
            Err(e) => {
                session_lost |= matches!(e, Error::InvalidSession(_));
                json!({ "error": e.message() })
            }
        };
        report.insert(kind.to_string(), entry);
    }
    print_json(&report)?;

    if session_lost {
        bail!("Session is no longer valid. Run `gamerlink login` again.");
    }
    Ok(())
}

/// Verify periodically and print notifications until logout or Ctrl-C
pub async fn watch(client: &SessionClient, interval_secs: u64) -> Result<()> {
    if !client.is_logged_in() {
        bail!(NOT_LOGGED_IN);
    }

    let mut notifications = client.subscribe();
    let logout_name = client.notification_name(EventKind::Logout);
    client.start_auto_verify(Some(Duration::from_secs(interval_secs)));
    eprintln!("Watching session every {}s. Press Ctrl-C to stop.", interval_secs);

    let result = loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(notification) => {
                    let line = json!({ "event": notification.name, "payload": notification.payload });
                    if let Err(e) = print_json(&line) {
                        break Err(e);
                    }
                    if notification.name == logout_name {
                        break Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed notifications"),
                Err(RecvError::Closed) => break Ok(()),
            },
            signal = tokio::signal::ctrl_c() => {
                break signal.context("Failed to listen for Ctrl-C");
            }
        }
    };

    client.stop_auto_verify();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamerlink_core::{SessionStore, UserRef};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn logged_in_client(server: &MockServer, dir: &TempDir) -> SessionClient {
        SessionStore::new(dir.path(), "cli").save("T1", UserRef::new("Jackie", None));
        Mock::given(method("POST"))
            .and(path("/auth/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "valid": true })))
            .mount(server)
            .await;
        SessionClient::builder()
            .api_root(server.uri())
            .storage_dir(dir.path())
            .storage_key("cli")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_keeps_session_on_unreadable_user() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let client = logged_in_client(&server, &dir).await;
        Mock::given(method("GET"))
            .and(path("/auth/user"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = status(&client).await.unwrap_err();
        assert!(err.to_string().starts_with("Could not reach"));
        assert!(client.is_logged_in());
    }

    #[tokio::test]
    async fn test_status_reports_lost_session() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let client = logged_in_client(&server, &dir).await;
        Mock::given(method("GET"))
            .and(path("/auth/user"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = status(&client).await.unwrap_err();
        assert!(err.to_string().starts_with("Session is no longer valid"));
        assert!(!client.is_logged_in());
    }
}
