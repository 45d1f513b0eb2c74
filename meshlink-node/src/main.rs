// Meshlink node: runs this device and a companion on an in-process mesh and logs
// what the presentation layer would show.

use meshlink_core::{DisplayState, MeshCore, Notification, PeerIdentity};
use meshlink_node::config::{self, InitialRole};
use meshlink_node::{spawn, LocalMesh, NodeHandle, Spawned};
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("meshlink-node {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("meshlink=info".parse()?))
        .init();

    let cfg = config::load()?;
    info!(name = %cfg.display_name, service_tag = %cfg.service_tag, role = ?cfg.initial_role, "starting");

    let mesh = LocalMesh::new();
    let local = join(&mesh, &cfg.display_name, &cfg);
    let companion_name = format!("{}-peer", cfg.display_name);
    let companion = join(&mesh, &companion_name, &cfg);

    match cfg.initial_role {
        InitialRole::Browse => {
            companion.handle.start_advertising()?;
            local.handle.start_browsing()?;
        }
        InitialRole::Advertise => {
            companion.handle.start_browsing()?;
            local.handle.start_advertising()?;
        }
        InitialRole::Idle => {}
    }

    let local_task = local.task;
    let companion_task = companion.task;
    let present_local = tokio::spawn(present(
        cfg.display_name.clone(),
        local.handle.clone(),
        local.notifications,
    ));
    let present_companion = tokio::spawn(present(
        companion_name,
        companion.handle.clone(),
        companion.notifications,
    ));

    shutdown_signal().await?;
    info!("shutting down");
    let _ = local.handle.shutdown();
    let _ = companion.handle.shutdown();
    local_task.await?;
    companion_task.await?;
    present_local.abort();
    present_companion.abort();
    Ok(())
}

fn join(mesh: &LocalMesh, name: &str, cfg: &config::Config) -> Spawned {
    let identity = PeerIdentity::new(name);
    let core = MeshCore::new(identity.clone(), cfg.service_tag.clone());
    spawn(core, |sink| mesh.attach(identity, sink))
}

/// Stand-in presentation layer: log every notification and greet peers once connected.
async fn present(
    name: String,
    handle: NodeHandle,
    mut notifications: tokio::sync::mpsc::UnboundedReceiver<Notification>,
) {
    while let Some(n) = notifications.recv().await {
        match n {
            Notification::StateChanged(state) => {
                info!(node = %name, status = %state, "status");
                if state == DisplayState::Connected && handle.send_greeting().is_err() {
                    break;
                }
            }
            Notification::RoleChanged(role) => info!(node = %name, %role, "role"),
            Notification::MessageReceived { from, text } => {
                info!(node = %name, from = from.display_name(), "message: {}", text)
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
