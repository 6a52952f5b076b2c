//! Which storage backends currently hold a usable copy of a job's artifact.

use mirror_contract::{DownloadInfo, Provider, ProviderName, TransferRecord, TransferStatus};

/// The provider whose only retrieval path streams through our own backend.
pub const PROXY_ONLY_PROVIDER: Provider = Provider::R2;

pub const NO_SOURCES_MESSAGE: &str = "No download sources are currently available.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAvailability {
    pub provider: ProviderName,
    pub available: bool,
}

impl ProviderAvailability {
    fn present(provider: impl Into<ProviderName>) -> Self {
        Self {
            provider: provider.into(),
            available: true,
        }
    }

    pub fn name(&self) -> &str {
        self.provider.as_str()
    }
}

/// Providers holding a copy of `record`, in fixed provider order.
///
/// Identifiers on a job that has not completed are ignored: they may be set
/// before the copy can be verified.
pub fn resolve(record: &TransferRecord) -> Vec<ProviderAvailability> {
    if record.status != TransferStatus::Completed {
        return Vec::new();
    }
    Provider::ALL
        .into_iter()
        .filter(|provider| record.provider_id(*provider).is_some())
        .map(ProviderAvailability::present)
        .collect()
}

/// Same as [`resolve`] but without the proxy-only provider, for views that
/// only offer retrieval costing the backend no bandwidth.
pub fn resolve_zero_bandwidth(record: &TransferRecord) -> Vec<ProviderAvailability> {
    without_proxy_only(resolve(record))
}

/// Availability from the public download-info endpoint. Known providers come
/// first in fixed order, then any unrecognized names alphabetically.
pub fn resolve_info(info: &DownloadInfo) -> Vec<ProviderAvailability> {
    let flagged: Vec<ProviderName> = info.flagged_providers().collect();

    let known = Provider::ALL
        .into_iter()
        .filter(|provider| flagged.contains(&ProviderName::Known(*provider)))
        .map(ProviderAvailability::present);

    let mut unknown: Vec<ProviderName> = flagged
        .iter()
        .filter(|name| name.known().is_none())
        .cloned()
        .collect();
    unknown.sort();

    known
        .chain(unknown.into_iter().map(ProviderAvailability::present))
        .collect()
}

pub fn resolve_info_zero_bandwidth(info: &DownloadInfo) -> Vec<ProviderAvailability> {
    without_proxy_only(resolve_info(info))
}

fn without_proxy_only(list: Vec<ProviderAvailability>) -> Vec<ProviderAvailability> {
    list.into_iter()
        .filter(|entry| entry.provider != ProviderName::Known(PROXY_ONLY_PROVIDER))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::job_store::fixtures::record;

    fn names(list: &[ProviderAvailability]) -> Vec<(String, bool)> {
        list.iter()
            .map(|entry| (entry.name().to_string(), entry.available))
            .collect()
    }

    #[test]
    fn single_pixeldrain_copy() {
        let mut job = record("job-1", TransferStatus::Completed);
        job.size = Some("1073741824".to_string());
        job.pixeldrain_id = Some("abc".to_string());

        assert_eq!(names(&resolve(&job)), vec![("pixeldrain".to_string(), true)]);
    }

    #[test]
    fn output_follows_fixed_order() {
        let mut job = record("job-1", TransferStatus::Completed);
        job.vikingfile_id = Some("v".to_string());
        job.r2_key = Some("k".to_string());
        job.idrive_key = Some("i".to_string());

        assert_eq!(
            names(&resolve(&job)),
            vec![
                ("r2".to_string(), true),
                ("idrive".to_string(), true),
                ("vikingfile".to_string(), true),
            ]
        );
    }

    #[test]
    fn unfinished_jobs_have_no_sources() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::Downloading,
            TransferStatus::Failed,
        ] {
            let mut job = record("job-1", status);
            job.r2_key = Some("k".to_string());
            job.pixeldrain_id = Some("p".to_string());
            assert!(resolve(&job).is_empty(), "{status:?} should resolve empty");
        }
    }

    #[test]
    fn completed_without_identifiers_is_empty() {
        let job = record("job-1", TransferStatus::Completed);
        assert!(resolve(&job).is_empty());
    }

    #[test]
    fn zero_bandwidth_drops_proxy_only_provider() {
        let mut job = record("job-1", TransferStatus::Completed);
        job.r2_key = Some("k".to_string());
        job.idrive_key = Some("i".to_string());

        assert_eq!(
            names(&resolve_zero_bandwidth(&job)),
            vec![("idrive".to_string(), true)]
        );
    }

    #[test]
    fn info_orders_known_then_unknown() {
        let mut providers = BTreeMap::new();
        providers.insert("vikingfile".to_string(), true);
        providers.insert("zeta".to_string(), true);
        providers.insert("alpha".to_string(), true);
        providers.insert("r2".to_string(), true);
        providers.insert("idrive".to_string(), false);
        let info = DownloadInfo {
            id: "job-1".to_string(),
            original_name: None,
            mime_type: None,
            size: None,
            providers,
            vikingfile_url: None,
        };

        assert_eq!(
            names(&resolve_info(&info)),
            vec![
                ("r2".to_string(), true),
                ("vikingfile".to_string(), true),
                ("alpha".to_string(), true),
                ("zeta".to_string(), true),
            ]
        );
        assert_eq!(names(&resolve_info_zero_bandwidth(&info)).len(), 3);
    }
}
