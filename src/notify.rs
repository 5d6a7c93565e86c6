//! Multi-channel operator notifications.
//!
//! Every notification is rendered first, then offered to each configured channel
//! in turn. A failing channel never prevents the next one from being tried, and
//! the caller only sees success when every configured channel accepted the
//! message.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::collaborators::{Incident, MailTransport, PagingClient};
use crate::config::{MailSettings, PagingSettings};
use crate::template::{RenderError, RenderedMessage, TemplateEngine};
use crate::types::ResolvedBackupTarget;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("could not render message: {0}")]
    Render(#[from] RenderError),

    #[error("No message output is set up, so no message has been sent")]
    NoChannelConfigured,

    #[error("Could not send one or more messages ({}), consult logs for details", .failed.join(", "))]
    PartialDelivery { failed: Vec<String> },
}

/// Result of offering a message to one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Sent,
    Failed(String),
    /// Configured, but not used for this kind of message
    Skipped,
    NotConfigured,
}

impl ChannelOutcome {
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::NotConfigured)
    }
}

impl fmt::Display for ChannelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Skipped => write!(f, "skipped"),
            Self::NotConfigured => write!(f, "not configured"),
        }
    }
}

/// Aggregate result of one notification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub message: RenderedMessage,
    pub mail: ChannelOutcome,
    pub paging: ChannelOutcome,
}

impl NotificationOutcome {
    /// Neither mail nor paging is configured
    pub fn nothing_configured(&self) -> bool {
        !self.mail.is_configured() && !self.paging.is_configured()
    }

    /// Names of the channels that failed
    pub fn failed_channels(&self) -> Vec<String> {
        [("mail", &self.mail), ("paging", &self.paging)]
            .into_iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Collapse into the caller-facing result
    pub fn into_result(self) -> Result<(), NotifyError> {
        if self.nothing_configured() {
            return Err(NotifyError::NoChannelConfigured);
        }
        let failed = self.failed_channels();
        if !failed.is_empty() {
            return Err(NotifyError::PartialDelivery { failed });
        }
        Ok(())
    }
}

/// Sends rendered messages over mail and paging
pub struct NotificationDispatcher {
    engine: TemplateEngine,
    mail_settings: MailSettings,
    paging_settings: PagingSettings,
    mail: Box<dyn MailTransport>,
    pager: Box<dyn PagingClient>,
}

impl NotificationDispatcher {
    pub fn new(
        mail_settings: MailSettings,
        paging_settings: PagingSettings,
        mail: Box<dyn MailTransport>,
        pager: Box<dyn PagingClient>,
    ) -> Self {
        Self {
            engine: TemplateEngine::new(),
            mail_settings,
            paging_settings,
            mail,
            pager,
        }
    }

    pub fn mail_settings(&self) -> &MailSettings {
        &self.mail_settings
    }

    /// Render and send; success only when every configured channel succeeded.
    ///
    /// An empty `error` marks a success notification, which is never paged.
    pub fn notify(
        &self,
        target: &ResolvedBackupTarget,
        subject_template: &str,
        body_template: &str,
        error: &str,
    ) -> Result<(), NotifyError> {
        self.dispatch(target, subject_template, body_template, error)?
            .into_result()
    }

    /// Render and offer the message to every channel, reporting each outcome
    pub fn dispatch(
        &self,
        target: &ResolvedBackupTarget,
        subject_template: &str,
        body_template: &str,
        error: &str,
    ) -> Result<NotificationOutcome, RenderError> {
        let message = self
            .engine
            .render(target, subject_template, body_template, error)
            .inspect_err(|e| tracing::error!("Could not generate message: {}", e))?;

        let mail = self.send_mail(&message);
        let paging = self.send_page(target, &message, error);

        Ok(NotificationOutcome {
            message,
            mail,
            paging,
        })
    }

    fn send_mail(&self, message: &RenderedMessage) -> ChannelOutcome {
        if !self.mail_settings.is_configured() {
            tracing::info!("SMTP is not configured so not sending email");
            return ChannelOutcome::NotConfigured;
        }

        match self
            .mail
            .send(&self.mail_settings, &message.subject, &message.body)
        {
            Ok(()) => {
                tracing::debug!("Sent mail '{}' to {:?}", message.subject, self.mail_settings.send_to);
                ChannelOutcome::Sent
            }
            Err(e) => {
                tracing::error!("Could not send email: {}", e);
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    fn send_page(
        &self,
        target: &ResolvedBackupTarget,
        message: &RenderedMessage,
        error: &str,
    ) -> ChannelOutcome {
        if !self.paging_settings.is_configured() {
            if !error.is_empty() {
                tracing::info!("Pagerduty is not configured so not sending alert");
            }
            return ChannelOutcome::NotConfigured;
        }
        if error.is_empty() {
            return ChannelOutcome::Skipped;
        }

        let incident = build_incident(&self.paging_settings, target, &message.body);
        match self.pager.send_incident(&incident) {
            Ok(()) => {
                tracing::debug!("Triggered incident {}", incident.incident_key);
                ChannelOutcome::Sent
            }
            Err(e) => {
                tracing::error!("Could not send pagerduty alert: {}", e);
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Incident for a failed backup, deduplicated per database and volume
pub fn build_incident(
    settings: &PagingSettings,
    target: &ResolvedBackupTarget,
    summary: &str,
) -> Incident {
    let details = BTreeMap::from([
        ("volumeid".to_string(), target.volume_id.clone()),
        ("dbname".to_string(), target.database.dbname.clone()),
        ("dbhost".to_string(), target.database.host.clone()),
        ("svm".to_string(), target.volume.svm.clone()),
    ]);

    Incident {
        service_key: settings.service_key.clone(),
        incident_key: format!(
            "smartbackup-{}-{}",
            target.database.name, target.volume.name
        ),
        description: summary.to_string(),
        details,
    }
}
