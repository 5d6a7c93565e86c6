//! Paging hook: `trigger-incident`, incident JSON on stdin.
//!
//! The service key is exported as `SMARTBACKUP_SERVICE_KEY` and left out of
//! the JSON document.

use crate::collaborators::{CollaboratorError, CollaboratorResult, Incident, PagingClient};
use crate::config::HookCommandConfig;
use crate::hook_runner::run_hook;
use crate::hook_traits::HookArgs;

#[derive(Debug, Clone)]
pub struct TriggerIncidentArgs<'a> {
    pub incident: &'a Incident,
    /// Serialized incident
    pub document: String,
}

impl<'a> TriggerIncidentArgs<'a> {
    pub fn new(incident: &'a Incident) -> Result<Self, serde_json::Error> {
        Ok(Self {
            incident,
            document: serde_json::to_string(incident)?,
        })
    }
}

impl HookArgs for TriggerIncidentArgs<'_> {
    fn operation(&self) -> &'static str {
        "trigger-incident"
    }

    fn to_cli_args(&self) -> Vec<String> {
        Vec::new()
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![(
            "SMARTBACKUP_SERVICE_KEY".to_string(),
            self.incident.service_key.clone(),
        )]
    }

    fn stdin(&self) -> Option<String> {
        Some(self.document.clone())
    }
}

/// [`PagingClient`] backed by a hook command
#[derive(Debug, Clone)]
pub struct HookPager {
    hook: HookCommandConfig,
}

impl HookPager {
    pub fn new(hook: HookCommandConfig) -> Self {
        Self { hook }
    }
}

impl PagingClient for HookPager {
    fn send_incident(&self, incident: &Incident) -> CollaboratorResult<()> {
        let args = TriggerIncidentArgs::new(incident)
            .map_err(|e| CollaboratorError::malformed("trigger-incident", e.to_string()))?;
        run_hook(&self.hook, &args)?.ensure_success(args.operation())
    }
}
