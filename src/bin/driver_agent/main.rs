use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use taxi_dispatch::client::DispatchClient;
use taxi_dispatch::location::{FixedPosition, LocationTracker, PositionSource, ReplayPositions};
use taxi_dispatch::models::Role;
use taxi_dispatch::session_store::SessionStore;
use taxi_dispatch::watcher::{LogNotifier, run_watcher};

mod loops;
mod settings;

use settings::AgentSettings;

pub type AgentError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AgentError> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = AgentSettings::from_env()?;
    let client = DispatchClient::new(&settings.dispatch_url)?;

    let mut session = SessionStore::new(&settings.session_file);
    if let Some(stored) = session.load().await? {
        tracing::info!(user_id = %stored.id, "found stored session");
    }

    let user = match client.login(&settings.phone_number, &settings.pin).await {
        Ok(user) => user,
        Err(e) => {
            session.update_user(None).await?;
            return Err(format!("Login failed: {}", e).into());
        }
    };
    if user.role != Role::Driver {
        client.logout().await.ok();
        session.update_user(None).await?;
        return Err(format!("Account role is {}, the agent only runs for drivers", user.role).into());
    }
    session.update_user(Some(user.clone())).await?;

    let navigation = client.navigation().await?;
    tracing::info!(user_id = %user.id, tabs = ?navigation.tabs, "logged in");

    let profile = client.set_duty(true).await?;
    if !profile.is_on_duty {
        return Err("Server did not confirm duty status".into());
    }
    tracing::info!(name = %profile.name, balance = profile.balance, "on duty");

    let source: Box<dyn PositionSource> = match (&settings.positions_file, settings.fixed_position) {
        (Some(path), _) => Box::new(ReplayPositions::from_file(path)?),
        (None, Some(fix)) => Box::new(FixedPosition(fix)),
        (None, None) => return Err("No position source configured".into()),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tasks = vec![
        tokio::spawn(loops::location_loop(
            client.clone(),
            source,
            LocationTracker::new(settings.min_distance_m),
            settings.location_interval,
            shutdown_rx.clone(),
        )),
        tokio::spawn(loops::request_poller(
            client.clone(),
            settings.request_poll,
            settings.auto_accept,
            shutdown_rx.clone(),
        )),
        tokio::spawn(run_watcher(
            client.clone(),
            LogNotifier,
            settings.watch_poll,
            shutdown_rx,
        )),
    ];

    tokio::signal::ctrl_c().await?;
    tracing::info!("stopping driver agent");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "agent task panicked");
        }
    }

    match client.set_duty(false).await {
        Ok(profile) => tracing::info!(is_on_duty = profile.is_on_duty, "off duty"),
        Err(e) => tracing::warn!(error = %e, "failed to go off duty"),
    }
    if let Err(e) = client.logout().await {
        tracing::warn!(error = %e, "logout failed");
    }
    session.update_user(None).await?;

    Ok(())
}
