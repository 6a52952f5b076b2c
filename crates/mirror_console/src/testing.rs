//! Scriptable stand-ins for the backend and launcher ports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mirror_client::{BackendApi, ClientError};
use mirror_contract::{
    AuthResponse, CredentialsUpdate, DirectUrlResponse, DownloadInfo, TransferRecord,
    TransferStatus, UpdateResponse, User,
};

use crate::job_store::fixtures::record;
use crate::launcher::{LaunchError, Launcher};

pub(crate) struct ScriptedList {
    pub(crate) delay: Duration,
    pub(crate) result: Result<Vec<TransferRecord>, ClientError>,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub(crate) list_calls: AtomicUsize,
    pub(crate) direct_calls: AtomicUsize,
    pub(crate) other_calls: AtomicUsize,
    pub(crate) scripted_lists: Mutex<VecDeque<ScriptedList>>,
    pub(crate) files: Mutex<Vec<TransferRecord>>,
    pub(crate) direct: Mutex<Option<Result<DirectUrlResponse, ClientError>>>,
    pub(crate) direct_delay: Mutex<Duration>,
    pub(crate) info: Mutex<Option<DownloadInfo>>,
    pub(crate) info_error: Mutex<Option<ClientError>>,
    pub(crate) mutation_error: Mutex<Option<ClientError>>,
    pub(crate) last_update: Mutex<Option<CredentialsUpdate>>,
}

impl FakeApi {
    pub(crate) fn with_files(files: Vec<TransferRecord>) -> Self {
        let api = Self::default();
        *api.files.lock().unwrap() = files;
        api
    }

    pub(crate) fn script(&self, delay: Duration, result: Result<Vec<TransferRecord>, ClientError>) {
        self.scripted_lists
            .lock()
            .unwrap()
            .push_back(ScriptedList { delay, result });
    }

    pub(crate) fn set_files(&self, files: Vec<TransferRecord>) {
        *self.files.lock().unwrap() = files;
    }

    pub(crate) fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn direct_count(&self) -> usize {
        self.direct_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.list_count() + self.direct_count() + self.other_calls.load(Ordering::SeqCst)
    }

    fn mutation_result(&self) -> Result<(), ClientError> {
        match self.mutation_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BackendApi for FakeApi {
    async fn list_files(&self) -> Result<Vec<TransferRecord>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.scripted_lists.lock().unwrap().pop_front();
        match scripted {
            Some(ScriptedList { delay, result }) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => Ok(self.files.lock().unwrap().clone()),
        }
    }

    async fn create_transfer(&self, _url: &str) -> Result<TransferRecord, ClientError> {
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_result()?;
        let created = record("job-new", TransferStatus::Pending);
        self.files.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn delete_file(&self, id: &str) -> Result<(), ClientError> {
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_result()?;
        self.files.lock().unwrap().retain(|file| file.id != id);
        Ok(())
    }

    async fn download_info(&self, id: &str) -> Result<DownloadInfo, ClientError> {
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.info_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.info
            .lock()
            .unwrap()
            .clone()
            .filter(|info| info.id == id)
            .ok_or_else(|| ClientError::Network(format!("download info: no job {id}")))
    }

    async fn direct_url(
        &self,
        _id: &str,
        _provider: &str,
    ) -> Result<DirectUrlResponse, ClientError> {
        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.direct_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.direct
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(DirectUrlResponse::default()))
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        if password != "correct" {
            return Err(ClientError::Auth("Invalid credentials".to_string()));
        }
        Ok(AuthResponse {
            token: "tok".to_string(),
            user: User {
                id: "u-1".to_string(),
                email: email.to_string(),
            },
        })
    }

    async fn update_credentials(
        &self,
        update: &CredentialsUpdate,
    ) -> Result<UpdateResponse, ClientError> {
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_result()?;
        *self.last_update.lock().unwrap() = Some(update.clone());
        Ok(UpdateResponse {
            message: Some("Credentials updated".to_string()),
            user: Some(User {
                id: "u-1".to_string(),
                email: update
                    .new_email
                    .clone()
                    .unwrap_or_else(|| "ops@example.com".to_string()),
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Launched {
    Detached(String),
    Saved { url: String, file_name: String },
}

#[derive(Default)]
pub(crate) struct RecordingLauncher {
    pub(crate) launched: Mutex<Vec<Launched>>,
}

impl RecordingLauncher {
    pub(crate) fn launched(&self) -> Vec<Launched> {
        self.launched.lock().unwrap().clone()
    }
}

impl Launcher for RecordingLauncher {
    fn open_detached(&self, url: &str) -> Result<(), LaunchError> {
        self.launched
            .lock()
            .unwrap()
            .push(Launched::Detached(url.to_string()));
        Ok(())
    }

    fn save_as(&self, url: &str, file_name: &str) -> Result<(), LaunchError> {
        self.launched.lock().unwrap().push(Launched::Saved {
            url: url.to_string(),
            file_name: file_name.to_string(),
        });
        Ok(())
    }
}
