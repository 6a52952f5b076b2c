use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use mirror_client::save_stream;
use mirror_console::{LaunchError, Launcher};
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Opens URLs with the platform opener and saves proxy streams into a
/// local directory on background tasks.
pub struct SystemLauncher {
    client: Client,
    download_dir: PathBuf,
    saves: Mutex<Vec<JoinHandle<()>>>,
}

impl SystemLauncher {
    pub fn new(client: Client, download_dir: PathBuf) -> Self {
        Self {
            client,
            download_dir,
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Waits for every background save started so far.
    pub async fn drain(&self) {
        let pending: Vec<JoinHandle<()>> = self
            .saves
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for save in pending {
            if let Err(err) = save.await {
                warn!(error = %err, "download task ended abnormally");
            }
        }
    }
}

impl Launcher for SystemLauncher {
    fn open_detached(&self, url: &str) -> Result<(), LaunchError> {
        opener_command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|err| LaunchError::Failed {
                url: url.to_string(),
                reason: err.to_string(),
            })
    }

    fn save_as(&self, url: &str, file_name: &str) -> Result<(), LaunchError> {
        let runtime = Handle::try_current()
            .map_err(|err| LaunchError::Unavailable(format!("no async runtime: {err}")))?;

        let client = self.client.clone();
        let dir = self.download_dir.clone();
        let url = url.to_string();
        let file_name = file_name.to_string();
        let save = runtime.spawn(async move {
            match save_stream(&client, &url, &dir, &file_name).await {
                Ok((path, bytes)) => {
                    info!(path = %path.display(), bytes, "download saved");
                    println!("saved {} ({bytes} bytes)", path.display());
                }
                Err(err) => {
                    warn!(url = %url, error = %err, "download failed");
                    eprintln!("download failed: {err}");
                }
            }
        });
        self.saves
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(save);
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}

#[cfg(target_os = "windows")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}
