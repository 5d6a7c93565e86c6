//! Mail hook: `send-mail --server --port --from --to... --subject`, body on stdin.

use crate::collaborators::{CollaboratorResult, MailTransport};
use crate::config::{HookCommandConfig, MailSettings};
use crate::hook_runner::run_hook;
use crate::hook_traits::{flag, HookArgs};

#[derive(Debug, Clone)]
pub struct SendMailArgs<'a> {
    pub settings: &'a MailSettings,
    pub subject: &'a str,
    pub body: &'a str,
}

impl HookArgs for SendMailArgs<'_> {
    fn operation(&self) -> &'static str {
        "send-mail"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        args.extend(flag("server", &self.settings.server));
        args.extend(flag("port", self.settings.port));
        args.extend(flag("from", &self.settings.from));
        for recipient in &self.settings.send_to {
            args.extend(flag("to", recipient));
        }
        args.extend(flag("subject", self.subject));
        args
    }

    fn stdin(&self) -> Option<String> {
        Some(self.body.to_string())
    }
}

/// [`MailTransport`] backed by a hook command
#[derive(Debug, Clone)]
pub struct HookMail {
    hook: HookCommandConfig,
}

impl HookMail {
    pub fn new(hook: HookCommandConfig) -> Self {
        Self { hook }
    }
}

impl MailTransport for HookMail {
    fn send(&self, settings: &MailSettings, subject: &str, body: &str) -> CollaboratorResult<()> {
        let args = SendMailArgs { settings, subject, body };
        run_hook(&self.hook, &args)?.ensure_success(args.operation())
    }
}
