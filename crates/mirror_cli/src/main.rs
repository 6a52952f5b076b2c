mod config;
mod launcher;
mod render;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use mirror_client::{BackendApi, HttpBackend};
use mirror_console::{
    Clock, Console, DispatchConfig, DispatchOutcome, Dispatcher, Route, RouteDecision,
    SessionGuard, SystemClock, ViewVariant,
};
use mirror_storage::{SessionStorage, StorageConfig};
use reqwest::Client;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::launcher::SystemLauncher;

#[derive(Debug, Parser)]
#[command(author, version, about = "Operator console for mirrored transfer jobs")]
struct Cli {
    #[arg(long, global = true, default_value = "config/console.toml")]
    config: PathBuf,
    /// Raise the default log level to debug.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Exchange credentials for a session token.
    Login {
        #[arg(long, env = "MIRRORCTL_EMAIL")]
        email: String,
        #[arg(long, env = "MIRRORCTL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Logout,
    Whoami,
    /// List transfer jobs.
    Files,
    /// Follow job status until interrupted.
    Watch {
        #[arg(long)]
        until_terminal: bool,
    },
    /// Start mirroring the file behind a public URL.
    Upload {
        url: String,
        #[arg(long)]
        watch: bool,
    },
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Show the public download page for a job.
    Info {
        id: String,
        #[arg(long, value_enum, default_value_t = Variant::Standard)]
        variant: Variant,
    },
    Download {
        id: String,
        #[arg(long)]
        provider: String,
        #[arg(long, value_enum, default_value_t = Variant::Standard)]
        variant: Variant,
        /// Control key for views offering several paths per provider,
        /// e.g. `idrive-fast`.
        #[arg(long)]
        control: Option<String>,
    },
    /// Change the operator's email or password.
    Account {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Variant {
    Standard,
    ZeroBandwidth,
    Mixed,
}

impl From<Variant> for ViewVariant {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Standard => ViewVariant::Standard,
            Variant::ZeroBandwidth => ViewVariant::ZeroBandwidth,
            Variant::Mixed => ViewVariant::Mixed,
        }
    }
}

struct App {
    config: RuntimeConfig,
    console: Console,
    dispatcher: Dispatcher,
    launcher: Arc<SystemLauncher>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose {
        "debug,sqlx=warn"
    } else {
        "info,sqlx=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RuntimeConfig::load(&cli.config)?;
    let app = App::build(config).await?;
    app.run(cli.command).await
}

impl App {
    async fn build(config: RuntimeConfig) -> Result<Self> {
        ensure_parent_dir(Path::new(&config.session.sqlite_path))?;
        let storage = SessionStorage::connect(&StorageConfig {
            sqlite_path: config.session.sqlite_path.clone(),
        })
        .await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let session = Arc::new(SessionGuard::restore(Arc::new(storage), clock.clone()).await?);

        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        let api: Arc<dyn BackendApi> = Arc::new(HttpBackend::with_client(
            http.clone(),
            config.api.base_url.clone(),
            session.clone(),
        ));

        let console = Console::new(api.clone(), session, config.share_base());
        let launcher = Arc::new(SystemLauncher::new(
            http,
            config.dispatch.download_dir.clone(),
        ));
        let dispatcher = Dispatcher::new(
            api,
            launcher.clone(),
            clock,
            DispatchConfig {
                api_base: config.api.base_url.trim_end_matches('/').to_string(),
                external_base: config.dispatch.external_base.clone(),
                cooldown: config.cooldown(),
            },
        );
        debug!(api = %config.api.base_url, "console ready");

        Ok(Self {
            config,
            console,
            dispatcher,
            launcher,
        })
    }

    async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, password } => self.login(&email, password).await,
            Command::Logout => {
                self.console.logout().await?;
                println!("logged out");
                Ok(())
            }
            Command::Whoami => {
                self.require(Route::Settings).await?;
                let session = self
                    .console
                    .session()
                    .current()
                    .ok_or_else(|| anyhow!("not logged in"))?;
                println!(
                    "{} (since {})",
                    session.user.email,
                    session.established_at.to_rfc3339()
                );
                Ok(())
            }
            Command::Files => {
                self.require(Route::Dashboard).await?;
                self.console.refresh().await?;
                print!("{}", render::file_table(&self.console.store().snapshot(), Utc::now()));
                Ok(())
            }
            Command::Watch { until_terminal } => {
                self.require(Route::Dashboard).await?;
                self.watch(until_terminal).await
            }
            Command::Upload { url, watch } => {
                self.require(Route::Dashboard).await?;
                let created = self.console.upload(&url).await?;
                println!("transfer {} queued", created.id);
                if watch {
                    self.watch(true).await?;
                }
                Ok(())
            }
            Command::Delete { id, yes } => {
                self.require(Route::Dashboard).await?;
                if !yes && !confirm(&format!("Delete transfer {id}?"))? {
                    println!("aborted");
                    return Ok(());
                }
                self.console.delete(&id).await?;
                println!("deleted {id}");
                Ok(())
            }
            Command::Info { id, variant } => {
                self.require(Route::Download(id.clone())).await?;
                let view = self.console.download_view(&id, variant.into()).await?;
                print!(
                    "{}",
                    render::download_view(&view, &self.dispatcher, &self.console.share_link(&id))
                );
                Ok(())
            }
            Command::Download {
                id,
                provider,
                variant,
                control,
            } => {
                self.require(Route::Download(id.clone())).await?;
                self.download(&id, &provider, variant.into(), control).await
            }
            Command::Account { email, password } => {
                self.require(Route::Settings).await?;
                let message = self.console.update_credentials(email, password).await?;
                println!("{}", message.as_deref().unwrap_or("credentials updated"));
                Ok(())
            }
        }
    }

    async fn login(&self, email: &str, password: Option<String>) -> Result<()> {
        let password = match password {
            Some(password) => password,
            None => prompt("Password: ")?,
        };
        let session = self.console.login(email, &password).await?;
        println!("logged in as {}", session.user.email);
        Ok(())
    }

    /// Applies the route gate after a passive check of the durable token.
    async fn require(&self, route: Route) -> Result<()> {
        let session = self.console.session();
        session.observe().await?;
        match session.gate(route) {
            RouteDecision::Render(_) => Ok(()),
            RouteDecision::Redirect(Route::Login) => {
                bail!("not logged in; run `mirrorctl login --email <email>` first")
            }
            RouteDecision::Redirect(other) => bail!("route unavailable; try {other:?}"),
        }
    }

    async fn watch(&self, until_terminal: bool) -> Result<()> {
        let mut changes = self.console.store().subscribe();
        let mut scheduler = self.console.scheduler(self.config.poll_interval());
        let mut session_check = tokio::time::interval(self.config.poll_interval());
        scheduler.start();

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    changed.context("job store closed")?;
                    let snapshot = changes.borrow_and_update().clone();
                    print!("{}", render::file_table(&snapshot, Utc::now()));
                    println!();
                    if until_terminal && !self.console.store().has_pending_work() {
                        info!("all jobs terminal");
                        break;
                    }
                }
                _ = session_check.tick() => {
                    if !self.console.session().is_authenticated() {
                        scheduler.stop();
                        bail!("session expired; log in again");
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        scheduler.stop();
        Ok(())
    }

    async fn download(
        &self,
        id: &str,
        provider: &str,
        variant: ViewVariant,
        control: Option<String>,
    ) -> Result<()> {
        let view = self.console.download_view(id, variant).await?;
        if let Some(message) = view.empty_message() {
            bail!("{message}");
        }
        let key = control.unwrap_or_else(|| provider.trim().to_ascii_lowercase());

        let outcome = match view.download(&self.dispatcher, &key).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let notice = view.notice().unwrap_or_else(|| err.to_string());
                view.dismiss_notice();
                return Err(anyhow!(err).context(notice));
            }
        };
        match outcome {
            DispatchOutcome::Opened { url } => println!("opened direct link: {url}"),
            DispatchOutcome::Redirected { url } => println!("opened provider page: {url}"),
            DispatchOutcome::Saving { file_name, .. } => {
                println!(
                    "saving {file_name} into {}",
                    self.config.dispatch.download_dir.display()
                );
                self.launcher.drain().await;
            }
        }
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{question} [y/N] "))?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
