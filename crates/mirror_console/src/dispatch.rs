//! Retrieval strategies and the per-control dispatch gate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mirror_client::{proxy_url, BackendApi, ClientError};
use mirror_contract::{DownloadInfo, Provider, ProviderName, TransferRecord};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::launcher::{LaunchError, Launcher};
use crate::providers::{self, ProviderAvailability, NO_SOURCES_MESSAGE};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);
const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_EXTERNAL_BASE: &str = "https://vikingfile.com/f";
const FALLBACK_FILE_NAME: &str = "download";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Ask the backend for a short-lived pre-signed URL and open it.
    DirectPresigned,
    /// Download through the backend's streaming proxy.
    ProxyStream,
    /// Send the operator to the provider's own page; no API call.
    ExternalRedirect,
}

impl StrategyKind {
    pub fn uses_backend_bandwidth(self) -> bool {
        matches!(self, StrategyKind::ProxyStream)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Strategy {
    pub kind: StrategyKind,
    pub provider: Provider,
}

const STRATEGY_TABLE: [(Provider, StrategyKind); 4] = [
    (Provider::R2, StrategyKind::ProxyStream),
    (Provider::Pixeldrain, StrategyKind::DirectPresigned),
    (Provider::Idrive, StrategyKind::DirectPresigned),
    (Provider::Vikingfile, StrategyKind::ExternalRedirect),
];

/// Table lookup; unknown provider names have no strategy and stay inert.
pub fn strategy_for(provider: &ProviderName) -> Option<Strategy> {
    let known = provider.known()?;
    STRATEGY_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == known)
        .map(|(provider, kind)| Strategy {
            kind: *kind,
            provider: *provider,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewVariant {
    /// One control per provider, using the table strategy.
    Standard,
    /// Only strategies that cost the backend no bandwidth.
    ZeroBandwidth,
    /// Several controls for providers offering more than one path.
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOption {
    /// Gate key; unique within a view.
    pub key: String,
    pub label: String,
    pub provider: ProviderName,
    pub strategy: Option<Strategy>,
}

impl DownloadOption {
    fn from_table(provider: &ProviderName) -> Self {
        Self {
            key: provider.as_str().to_string(),
            label: provider.label().to_string(),
            provider: provider.clone(),
            strategy: strategy_for(provider),
        }
    }

    fn custom(key: &str, label: &str, provider: Provider, kind: StrategyKind) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            provider: ProviderName::Known(provider),
            strategy: Some(Strategy { kind, provider }),
        }
    }

    pub fn is_selectable(&self) -> bool {
        self.strategy.is_some()
    }
}

/// Controls a view offers for the given availability list.
pub fn download_options(
    variant: ViewVariant,
    available: &[ProviderAvailability],
) -> Vec<DownloadOption> {
    let names = available
        .iter()
        .filter(|entry| entry.available)
        .map(|entry| &entry.provider);

    match variant {
        ViewVariant::Standard => names.map(DownloadOption::from_table).collect(),
        ViewVariant::ZeroBandwidth => names
            .map(DownloadOption::from_table)
            .filter(|option| {
                option
                    .strategy
                    .map_or(true, |strategy| !strategy.kind.uses_backend_bandwidth())
            })
            .collect(),
        ViewVariant::Mixed => {
            let mut names: Vec<&ProviderName> = names.collect();
            names.sort_by_key(|name| mixed_rank(name));
            names.into_iter().flat_map(mixed_options).collect()
        }
    }
}

/// idrive leads the Mixed view; unknown names keep their place at the end.
fn mixed_rank(provider: &ProviderName) -> u8 {
    match provider.known() {
        Some(Provider::Idrive) => 0,
        Some(Provider::Pixeldrain) => 1,
        Some(Provider::Vikingfile) => 2,
        _ => 3,
    }
}

fn mixed_options(provider: &ProviderName) -> Vec<DownloadOption> {
    use StrategyKind::{DirectPresigned, ProxyStream};

    match provider.known() {
        // The bucket copy is only reachable through the standard views.
        Some(Provider::R2) => Vec::new(),
        Some(Provider::Idrive) => vec![
            DownloadOption::custom("idrive-instant", "Instant Download", Provider::Idrive, ProxyStream),
            DownloadOption::custom("idrive-fast", "Fast Cloud [FSL]", Provider::Idrive, DirectPresigned),
            DownloadOption::custom("idrive-resumable", "Cloud [Resumable]", Provider::Idrive, ProxyStream),
        ],
        Some(Provider::Pixeldrain) => vec![DownloadOption::custom(
            "pixeldrain",
            "Pixeldrain (Fast)",
            Provider::Pixeldrain,
            DirectPresigned,
        )],
        Some(Provider::Vikingfile) => vec![DownloadOption::custom(
            "vikingfile",
            "VikingFile Server",
            Provider::Vikingfile,
            DirectPresigned,
        )],
        _ => vec![DownloadOption::from_table(provider)],
    }
}

/// What a dispatch needs to know about the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub job_id: String,
    pub file_name: Option<String>,
    /// Provider-hosted page for the external redirect, when the backend
    /// knows it.
    pub external_url: Option<String>,
}

impl From<&DownloadInfo> for DownloadTarget {
    fn from(info: &DownloadInfo) -> Self {
        Self {
            job_id: info.id.clone(),
            file_name: info.original_name.clone(),
            external_url: info.vikingfile_url.clone(),
        }
    }
}

impl From<&TransferRecord> for DownloadTarget {
    fn from(record: &TransferRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            file_name: record.original_name.clone(),
            external_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Opened { url: String },
    Saving { url: String, file_name: String },
    Redirected { url: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no download sources are available for this job")]
    NoSources,
    #[error("unknown download option {0}")]
    UnknownOption(String),
    #[error("provider {0} does not hold a copy of this job")]
    NotAvailable(String),
    #[error("provider {0} has no retrieval strategy")]
    NoStrategy(String),
    #[error("a download via {0} is already starting")]
    Busy(String),
    #[error("missing direct download URL for job {job_id} on {provider}")]
    MissingUrl { job_id: String, provider: String },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl DispatchError {
    /// Short text for the view's transient notice.
    pub fn notice(&self) -> String {
        match self {
            DispatchError::Client(ClientError::Network(detail))
            | DispatchError::Client(ClientError::Auth(detail)) => detail.clone(),
            DispatchError::Client(ClientError::Status {
                detail: Some(detail),
                ..
            }) => detail.clone(),
            DispatchError::MissingUrl { .. } | DispatchError::Client(_) => {
                "Failed to initiate download.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    InFlight,
    CoolingUntil(Instant),
}

#[derive(Debug, Default)]
struct Gate {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Gate {
    fn state(&self, key: &str, now: Instant) -> DispatchState {
        match self.lock().get(key) {
            Some(Slot::InFlight) => DispatchState::Dispatching,
            Some(Slot::CoolingUntil(until)) if now < *until => DispatchState::Dispatching,
            _ => DispatchState::Idle,
        }
    }

    fn acquire(&self, key: &str, now: Instant) -> Option<Ticket<'_>> {
        let mut slots = self.lock();
        let busy = match slots.get(key) {
            Some(Slot::InFlight) => true,
            Some(Slot::CoolingUntil(until)) => now < *until,
            None => false,
        };
        if busy {
            return None;
        }
        slots.insert(key.to_string(), Slot::InFlight);
        Some(Ticket {
            gate: self,
            key: key.to_string(),
            armed: true,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds a control in `Dispatching`; dropping it returns the control to
/// `Idle` unless it was turned into a cool-down.
struct Ticket<'a> {
    gate: &'a Gate,
    key: String,
    armed: bool,
}

impl Ticket<'_> {
    fn cool_down_until(mut self, until: Instant) {
        self.gate
            .lock()
            .insert(self.key.clone(), Slot::CoolingUntil(until));
        self.armed = false;
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.lock().remove(&self.key);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Backend base URL used to build proxy addresses.
    pub api_base: String,
    pub external_base: String,
    /// How long a proxy or redirect control stays disabled after hand-off.
    pub cooldown: Duration,
}

impl DispatchConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            external_base: DEFAULT_EXTERNAL_BASE.to_string(),
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

pub struct Dispatcher {
    api: Arc<dyn BackendApi>,
    launcher: Arc<dyn Launcher>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
    gate: Gate,
}

impl Dispatcher {
    pub fn new(
        api: Arc<dyn BackendApi>,
        launcher: Arc<dyn Launcher>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            api,
            launcher,
            clock,
            config,
            gate: Gate::default(),
        }
    }

    pub fn state(&self, key: &str) -> DispatchState {
        self.gate.state(key, self.clock.now())
    }

    /// Runs `option` for `target` after checking it against `available`.
    ///
    /// A control already `Dispatching` is rejected; other controls are
    /// unaffected.
    pub async fn dispatch(
        &self,
        target: &DownloadTarget,
        available: &[ProviderAvailability],
        option: &DownloadOption,
    ) -> Result<DispatchOutcome, DispatchError> {
        if available.is_empty() {
            return Err(DispatchError::NoSources);
        }
        if !available
            .iter()
            .any(|entry| entry.available && entry.provider == option.provider)
        {
            return Err(DispatchError::NotAvailable(option.provider.to_string()));
        }
        let strategy = option
            .strategy
            .ok_or_else(|| DispatchError::NoStrategy(option.provider.to_string()))?;

        let ticket = self
            .gate
            .acquire(&option.key, self.clock.now())
            .ok_or_else(|| DispatchError::Busy(option.key.clone()))?;

        debug!(job_id = %target.job_id, key = %option.key, kind = ?strategy.kind, "dispatching download");
        let result = self.execute(&strategy, target).await;

        match (&result, strategy.kind) {
            // Settled request: the control is free again either way.
            (_, StrategyKind::DirectPresigned) | (Err(_), _) => drop(ticket),
            (Ok(_), _) => {
                let now = self.clock.now();
                let until = now
                    .checked_add(self.config.cooldown.min(MAX_COOLDOWN))
                    .unwrap_or(now);
                ticket.cool_down_until(until)
            }
        }
        if let Err(err) = &result {
            warn!(job_id = %target.job_id, key = %option.key, error = %err, "download dispatch failed");
        }
        result
    }

    /// Single entry point for every retrieval strategy.
    pub async fn execute(
        &self,
        strategy: &Strategy,
        target: &DownloadTarget,
    ) -> Result<DispatchOutcome, DispatchError> {
        let provider = strategy.provider.as_str();
        match strategy.kind {
            StrategyKind::DirectPresigned => {
                let response = self.api.direct_url(&target.job_id, provider).await?;
                let url = response
                    .url
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| DispatchError::MissingUrl {
                        job_id: target.job_id.clone(),
                        provider: provider.to_string(),
                    })?;
                self.launcher.open_detached(&url)?;
                info!(job_id = %target.job_id, provider, "opened direct download");
                Ok(DispatchOutcome::Opened { url })
            }
            StrategyKind::ProxyStream => {
                let url = proxy_url(&self.config.api_base, &target.job_id, provider);
                let file_name = target
                    .file_name
                    .clone()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
                self.launcher.save_as(&url, &file_name)?;
                info!(job_id = %target.job_id, provider, "proxy download handed off");
                Ok(DispatchOutcome::Saving { url, file_name })
            }
            StrategyKind::ExternalRedirect => {
                let url = target.external_url.clone().unwrap_or_else(|| {
                    format!(
                        "{}/{}",
                        self.config.external_base.trim_end_matches('/'),
                        target.job_id
                    )
                });
                self.launcher.open_detached(&url)?;
                info!(job_id = %target.job_id, provider, "redirected to provider page");
                Ok(DispatchOutcome::Redirected { url })
            }
        }
    }
}

/// Download controls for one job plus the view's transient notice.
pub struct DownloadView {
    pub target: DownloadTarget,
    pub variant: ViewVariant,
    pub available: Vec<ProviderAvailability>,
    pub options: Vec<DownloadOption>,
    notice: Mutex<Option<String>>,
}

impl DownloadView {
    pub fn new(
        target: DownloadTarget,
        variant: ViewVariant,
        available: Vec<ProviderAvailability>,
    ) -> Self {
        let options = download_options(variant, &available);
        Self {
            target,
            variant,
            available,
            options,
            notice: Mutex::new(None),
        }
    }

    pub fn from_record(record: &TransferRecord, variant: ViewVariant) -> Self {
        let available = match variant {
            ViewVariant::ZeroBandwidth => providers::resolve_zero_bandwidth(record),
            _ => providers::resolve(record),
        };
        Self::new(DownloadTarget::from(record), variant, available)
    }

    pub fn from_info(info: &DownloadInfo, variant: ViewVariant) -> Self {
        let available = match variant {
            ViewVariant::ZeroBandwidth => providers::resolve_info_zero_bandwidth(info),
            _ => providers::resolve_info(info),
        };
        Self::new(DownloadTarget::from(info), variant, available)
    }

    pub fn selectable(&self) -> impl Iterator<Item = &DownloadOption> {
        self.options.iter().filter(|option| option.is_selectable())
    }

    /// Placeholder text when there is nothing to dispatch.
    pub fn empty_message(&self) -> Option<&'static str> {
        if self.selectable().next().is_some() {
            return None;
        }
        Some(match self.variant {
            ViewVariant::ZeroBandwidth => "No direct download sources are currently available.",
            _ => NO_SOURCES_MESSAGE,
        })
    }

    pub fn option(&self, key: &str) -> Option<&DownloadOption> {
        self.options.iter().find(|option| option.key == key)
    }

    pub async fn download(
        &self,
        dispatcher: &Dispatcher,
        key: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        if self.empty_message().is_some() {
            return Err(DispatchError::NoSources);
        }
        let option = self
            .option(key)
            .ok_or_else(|| DispatchError::UnknownOption(key.to_string()))?;

        self.dismiss_notice();
        let result = dispatcher.dispatch(&self.target, &self.available, option).await;
        if let Err(err) = &result {
            if !matches!(err, DispatchError::Busy(_)) {
                self.set_notice(err.notice());
            }
        }
        result
    }

    pub fn notice(&self) -> Option<String> {
        self.notice
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn dismiss_notice(&self) {
        self.set_notice_opt(None);
    }

    fn set_notice(&self, message: String) {
        self.set_notice_opt(Some(message));
    }

    fn set_notice_opt(&self, message: Option<String>) {
        *self
            .notice
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = message;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mirror_client::ClientError;
    use mirror_contract::{format_size, DirectUrlResponse, Provider, ProviderName, TransferStatus};

    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::job_store::fixtures::record;
    use crate::testing::{FakeApi, Launched, RecordingLauncher};

    struct Harness {
        api: Arc<FakeApi>,
        launcher: Arc<RecordingLauncher>,
        clock: Arc<ManualClock>,
        dispatcher: Arc<Dispatcher>,
    }

    fn harness() -> Harness {
        let api = Arc::new(FakeApi::default());
        let launcher = Arc::new(RecordingLauncher::default());
        let clock = Arc::new(ManualClock::new());
        let dispatcher = Arc::new(Dispatcher::new(
            api.clone(),
            launcher.clone(),
            clock.clone(),
            DispatchConfig::new("http://localhost:3000"),
        ));
        Harness {
            api,
            launcher,
            clock,
            dispatcher,
        }
    }

    fn completed_with(provider: Provider) -> TransferRecord {
        let mut job = record("job-1", TransferStatus::Completed);
        match provider {
            Provider::R2 => job.r2_key = Some("key".to_string()),
            Provider::Pixeldrain => job.pixeldrain_id = Some("abc".to_string()),
            Provider::Idrive => job.idrive_key = Some("key".to_string()),
            Provider::Vikingfile => job.vikingfile_id = Some("vf".to_string()),
        }
        job
    }

    #[test]
    fn table_covers_known_providers_only() {
        assert_eq!(
            strategy_for(&ProviderName::Known(Provider::R2)).map(|s| s.kind),
            Some(StrategyKind::ProxyStream)
        );
        assert_eq!(
            strategy_for(&ProviderName::Known(Provider::Vikingfile)).map(|s| s.kind),
            Some(StrategyKind::ExternalRedirect)
        );
        assert_eq!(strategy_for(&ProviderName::Other("gofile".to_string())), None);
    }

    #[tokio::test]
    async fn pixeldrain_scenario_dispatches_direct() {
        let h = harness();
        *h.api.direct.lock().unwrap() = Some(Ok(DirectUrlResponse {
            url: Some("https://pixeldrain.example/u/abc".to_string()),
        }));
        let mut job = completed_with(Provider::Pixeldrain);
        job.size = Some("1073741824".to_string());

        let view = DownloadView::from_record(&job, ViewVariant::Standard);
        assert_eq!(format_size(job.size.as_deref()), "1.00 GB");
        assert_eq!(view.empty_message(), None);

        let outcome = view.download(&h.dispatcher, "pixeldrain").await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Opened {
                url: "https://pixeldrain.example/u/abc".to_string()
            }
        );
        assert_eq!(
            h.launcher.launched(),
            vec![Launched::Detached("https://pixeldrain.example/u/abc".to_string())]
        );
        assert_eq!(h.dispatcher.state("pixeldrain"), DispatchState::Idle);
    }

    #[tokio::test]
    async fn missing_url_surfaces_error_and_opens_nothing() {
        let h = harness();
        let job = completed_with(Provider::Idrive);
        let view = DownloadView::from_record(&job, ViewVariant::Standard);

        let err = view.download(&h.dispatcher, "idrive").await.unwrap_err();

        assert_eq!(
            err,
            DispatchError::MissingUrl {
                job_id: "job-1".to_string(),
                provider: "idrive".to_string()
            }
        );
        assert!(h.launcher.launched().is_empty());
        assert_eq!(h.dispatcher.state("idrive"), DispatchState::Idle);
        assert_eq!(view.notice().as_deref(), Some("Failed to initiate download."));

        view.dismiss_notice();
        assert_eq!(view.notice(), None);
    }

    #[tokio::test]
    async fn direct_failure_shows_backend_message() {
        let h = harness();
        *h.api.direct.lock().unwrap() =
            Some(Err(ClientError::Network("direct url: Provider offline".to_string())));
        let view = DownloadView::from_record(&completed_with(Provider::Pixeldrain), ViewVariant::Standard);

        view.download(&h.dispatcher, "pixeldrain").await.unwrap_err();

        assert_eq!(view.notice().as_deref(), Some("direct url: Provider offline"));
        assert_eq!(h.dispatcher.state("pixeldrain"), DispatchState::Idle);
    }

    #[tokio::test]
    async fn rejected_direct_url_shows_error_body_or_generic_text() {
        let h = harness();
        let view = DownloadView::from_record(&completed_with(Provider::Idrive), ViewVariant::Standard);

        *h.api.direct.lock().unwrap() = Some(Err(ClientError::Status {
            operation: "direct url".to_string(),
            status: 502,
            detail: Some("IDrive is unreachable".to_string()),
        }));
        view.download(&h.dispatcher, "idrive").await.unwrap_err();
        assert_eq!(view.notice().as_deref(), Some("IDrive is unreachable"));

        *h.api.direct.lock().unwrap() = Some(Err(ClientError::Status {
            operation: "direct url".to_string(),
            status: 500,
            detail: None,
        }));
        view.download(&h.dispatcher, "idrive").await.unwrap_err();
        assert_eq!(view.notice().as_deref(), Some("Failed to initiate download."));
    }

    #[tokio::test]
    async fn external_redirect_makes_no_http_call() {
        let h = harness();
        let view = DownloadView::from_record(&completed_with(Provider::Vikingfile), ViewVariant::Standard);

        let outcome = view.download(&h.dispatcher, "vikingfile").await.unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Redirected {
                url: "https://vikingfile.com/f/job-1".to_string()
            }
        );
        assert_eq!(h.api.total_calls(), 0);
    }

    #[tokio::test]
    async fn external_redirect_prefers_provider_page_from_info() {
        let h = harness();
        let target = DownloadTarget {
            job_id: "job-1".to_string(),
            file_name: None,
            external_url: Some("https://vikingfile.com/f/Xy12".to_string()),
        };
        let strategy = strategy_for(&ProviderName::Known(Provider::Vikingfile)).unwrap();

        h.dispatcher.execute(&strategy, &target).await.unwrap();

        assert_eq!(
            h.launcher.launched(),
            vec![Launched::Detached("https://vikingfile.com/f/Xy12".to_string())]
        );
    }

    #[tokio::test]
    async fn proxy_stream_saves_under_original_name_then_cools_down() {
        let h = harness();
        let view = DownloadView::from_record(&completed_with(Provider::R2), ViewVariant::Standard);

        let outcome = view.download(&h.dispatcher, "r2").await.unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Saving {
                url: "http://localhost:3000/api/download/job-1/proxy?provider=r2".to_string(),
                file_name: "job-1.mkv".to_string()
            }
        );
        assert_eq!(h.api.total_calls(), 0);
        assert_eq!(h.dispatcher.state("r2"), DispatchState::Dispatching);

        let again = view.download(&h.dispatcher, "r2").await.unwrap_err();
        assert_eq!(again, DispatchError::Busy("r2".to_string()));
        assert_eq!(view.notice(), None, "busy controls do not raise a notice");

        h.clock.advance(Duration::from_millis(2_001));
        assert_eq!(h.dispatcher.state("r2"), DispatchState::Idle);
        view.download(&h.dispatcher, "r2").await.unwrap();
        assert_eq!(h.launcher.launched().len(), 2);
    }

    #[tokio::test]
    async fn proxy_stream_falls_back_to_generic_name() {
        let h = harness();
        let mut job = completed_with(Provider::R2);
        job.original_name = None;
        let view = DownloadView::from_record(&job, ViewVariant::Standard);

        view.download(&h.dispatcher, "r2").await.unwrap();

        assert!(matches!(
            &h.launcher.launched()[0],
            Launched::Saved { file_name, .. } if file_name == "download"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_is_gated_while_direct_request_is_in_flight() {
        let h = harness();
        *h.api.direct_delay.lock().unwrap() = Duration::from_secs(5);
        *h.api.direct.lock().unwrap() = Some(Ok(DirectUrlResponse {
            url: Some("https://idrive.example/presigned".to_string()),
        }));
        let mut job = completed_with(Provider::Idrive);
        job.pixeldrain_id = Some("abc".to_string());
        let view = Arc::new(DownloadView::from_record(&job, ViewVariant::Standard));

        let first = {
            let view = view.clone();
            let dispatcher = h.dispatcher.clone();
            tokio::spawn(async move { view.download(&dispatcher, "idrive").await })
        };
        tokio::task::yield_now().await;
        assert_eq!(h.dispatcher.state("idrive"), DispatchState::Dispatching);

        let duplicate = view.download(&h.dispatcher, "idrive").await.unwrap_err();
        assert_eq!(duplicate, DispatchError::Busy("idrive".to_string()));
        assert_eq!(h.dispatcher.state("pixeldrain"), DispatchState::Idle);

        first.await.unwrap().unwrap();
        assert_eq!(h.dispatcher.state("idrive"), DispatchState::Idle);
        assert_eq!(h.api.direct_count(), 1);
    }

    #[tokio::test]
    async fn no_sources_means_no_dispatch() {
        let h = harness();
        let job = record("job-1", TransferStatus::Completed);
        let view = DownloadView::from_record(&job, ViewVariant::Standard);

        assert!(view.available.is_empty());
        assert_eq!(view.empty_message(), Some(NO_SOURCES_MESSAGE));
        assert_eq!(
            view.download(&h.dispatcher, "r2").await.unwrap_err(),
            DispatchError::NoSources
        );
        assert!(h.launcher.launched().is_empty());
    }

    #[tokio::test]
    async fn provider_outside_available_set_is_rejected() {
        let h = harness();
        let job = completed_with(Provider::Pixeldrain);
        let available = crate::providers::resolve(&job);
        let option = DownloadOption::from_table(&ProviderName::Known(Provider::R2));

        let err = h
            .dispatcher
            .dispatch(&DownloadTarget::from(&job), &available, &option)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::NotAvailable("r2".to_string()));
    }

    #[tokio::test]
    async fn unknown_provider_is_listed_but_inert() {
        let h = harness();
        let available = vec![ProviderAvailability {
            provider: ProviderName::Other("gofile".to_string()),
            available: true,
        }];
        let target = DownloadTarget {
            job_id: "job-1".to_string(),
            file_name: None,
            external_url: None,
        };
        let view = DownloadView::new(target, ViewVariant::Standard, available);

        assert_eq!(view.options.len(), 1);
        assert_eq!(view.options[0].label, "gofile");
        assert!(!view.options[0].is_selectable());
        assert_eq!(view.empty_message(), Some(NO_SOURCES_MESSAGE));

        let err = h
            .dispatcher
            .dispatch(&view.target, &view.available, &view.options[0])
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::NoStrategy("gofile".to_string()));
    }

    #[test]
    fn zero_bandwidth_view_offers_no_proxy_controls() {
        let mut job = completed_with(Provider::R2);
        job.pixeldrain_id = Some("abc".to_string());
        job.vikingfile_id = Some("vf".to_string());

        let view = DownloadView::from_record(&job, ViewVariant::ZeroBandwidth);
        let keys: Vec<&str> = view.options.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["pixeldrain", "vikingfile"]);

        let only_r2 = DownloadView::from_record(&completed_with(Provider::R2), ViewVariant::ZeroBandwidth);
        assert_eq!(
            only_r2.empty_message(),
            Some("No direct download sources are currently available.")
        );
    }

    #[test]
    fn mixed_view_splits_idrive_into_three_controls() {
        let mut job = completed_with(Provider::Idrive);
        job.pixeldrain_id = Some("abc".to_string());

        let view = DownloadView::from_record(&job, ViewVariant::Mixed);
        let keys: Vec<(&str, StrategyKind)> = view
            .options
            .iter()
            .map(|o| (o.key.as_str(), o.strategy.unwrap().kind))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("idrive-instant", StrategyKind::ProxyStream),
                ("idrive-fast", StrategyKind::DirectPresigned),
                ("idrive-resumable", StrategyKind::ProxyStream),
                ("pixeldrain", StrategyKind::DirectPresigned),
            ]
        );
    }

    #[test]
    fn mixed_view_has_no_bucket_control() {
        let mut job = completed_with(Provider::R2);
        job.vikingfile_id = Some("vf".to_string());

        let view = DownloadView::from_record(&job, ViewVariant::Mixed);
        let keys: Vec<&str> = view.options.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["vikingfile"]);

        let only_r2 = DownloadView::from_record(&completed_with(Provider::R2), ViewVariant::Mixed);
        assert!(only_r2.options.is_empty());
    }

    #[tokio::test]
    async fn oversized_cooldown_is_capped() {
        let api = Arc::new(FakeApi::default());
        let clock = Arc::new(ManualClock::new());
        let dispatcher = Dispatcher::new(
            api,
            Arc::new(RecordingLauncher::default()),
            clock.clone(),
            DispatchConfig {
                cooldown: Duration::MAX,
                ..DispatchConfig::new("http://localhost:3000")
            },
        );
        let view = DownloadView::from_record(&completed_with(Provider::Vikingfile), ViewVariant::Standard);

        view.download(&dispatcher, "vikingfile").await.unwrap();
        assert_eq!(dispatcher.state("vikingfile"), DispatchState::Dispatching);

        clock.advance(MAX_COOLDOWN);
        assert_eq!(dispatcher.state("vikingfile"), DispatchState::Idle);
    }

    #[tokio::test]
    async fn mixed_controls_for_one_provider_gate_independently() {
        let h = harness();
        *h.api.direct.lock().unwrap() = Some(Ok(DirectUrlResponse {
            url: Some("https://idrive.example/presigned".to_string()),
        }));
        let view = DownloadView::from_record(&completed_with(Provider::Idrive), ViewVariant::Mixed);

        view.download(&h.dispatcher, "idrive-instant").await.unwrap();
        assert_eq!(h.dispatcher.state("idrive-instant"), DispatchState::Dispatching);
        assert_eq!(h.dispatcher.state("idrive-resumable"), DispatchState::Idle);

        view.download(&h.dispatcher, "idrive-resumable").await.unwrap();
        view.download(&h.dispatcher, "idrive-fast").await.unwrap();
        assert_eq!(h.launcher.launched().len(), 3);
    }
}
