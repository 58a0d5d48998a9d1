use bgv::config::AppConfig;
use bgv::workflows::verification::{
    CandidateNotice, CandidateNotifier, InMemoryBlobStore, InMemoryVerificationRepository,
    NotifyError, ServiceSettings, VerificationService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type AppService =
    VerificationService<InMemoryVerificationRepository, InMemoryBlobStore, LoggingNotifier>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Stand-in for the email/WhatsApp gateway: every notice becomes a structured log line.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingNotifier;

impl CandidateNotifier for LoggingNotifier {
    fn notify(&self, notice: CandidateNotice) -> Result<(), NotifyError> {
        if notice.recipient.trim().is_empty() {
            return Err(NotifyError::Transport(format!(
                "record {} has no recipient address",
                notice.record_id
            )));
        }
        info!(
            template = ?notice.template,
            record_id = %notice.record_id,
            recipient = %notice.recipient,
            link = notice.details.get("link").map(String::as_str).unwrap_or_default(),
            "candidate notice dispatched"
        );
        Ok(())
    }
}

/// Blob URLs are served under the public base so links in descriptors resolve for admins.
pub(crate) fn blob_store(config: &AppConfig) -> InMemoryBlobStore {
    InMemoryBlobStore::new(format!(
        "{}/files",
        config.links.public_base_url.trim_end_matches('/')
    ))
}

pub(crate) fn build_service(config: &AppConfig) -> Arc<AppService> {
    build_service_with(config.service_settings(), blob_store(config))
}

pub(crate) fn build_service_with(
    settings: ServiceSettings,
    blobs: InMemoryBlobStore,
) -> Arc<AppService> {
    Arc::new(VerificationService::new(
        Arc::new(InMemoryVerificationRepository::default()),
        Arc::new(blobs),
        Arc::new(LoggingNotifier),
        settings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgv::workflows::verification::{NoticeTemplate, RecordId};
    use std::collections::BTreeMap;

    fn notice(recipient: &str) -> CandidateNotice {
        CandidateNotice {
            template: NoticeTemplate::LinkIssued,
            record_id: RecordId("rec-1".to_string()),
            recipient: recipient.to_string(),
            details: BTreeMap::new(),
        }
    }

    #[test]
    fn logging_notifier_requires_recipient() {
        let notifier = LoggingNotifier;
        assert!(notifier.notify(notice("candidate@example.com")).is_ok());
        assert!(matches!(
            notifier.notify(notice("  ")),
            Err(NotifyError::Transport(_))
        ));
    }
}
