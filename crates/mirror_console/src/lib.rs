mod clock;
mod console;
mod dispatch;
mod job_store;
mod launcher;
mod providers;
mod reconcile;
mod session;
#[cfg(test)]
mod testing;

pub use clock::{Clock, SystemClock};
pub use console::{Console, ConsoleError, FILE_UNAVAILABLE_MESSAGE};
pub use dispatch::{
    download_options, strategy_for, DispatchConfig, DispatchError, DispatchOutcome,
    DispatchState, Dispatcher, DownloadOption, DownloadTarget, DownloadView, Strategy,
    StrategyKind, ViewVariant, DEFAULT_COOLDOWN, DEFAULT_EXTERNAL_BASE,
};
pub use job_store::{JobStore, Snapshot};
pub use launcher::{LaunchError, Launcher};
pub use providers::{
    resolve, resolve_info, resolve_info_zero_bandwidth, resolve_zero_bandwidth,
    ProviderAvailability, NO_SOURCES_MESSAGE, PROXY_ONLY_PROVIDER,
};
pub use reconcile::{PollScheduler, Reconciler, TickOutcome, DEFAULT_POLL_INTERVAL};
pub use session::{Route, RouteDecision, Session, SessionGuard, SessionStore};
