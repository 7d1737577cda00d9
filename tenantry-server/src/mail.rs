use std::sync::Arc;

use async_trait::async_trait;
use tenantry_shared::roles::MemberRole;
use tracing::info;

use crate::{
    config::{AppConfig, MailDriver},
    response::ServerResult,
};

#[derive(Debug, Clone)]
pub struct InviteEmail {
    pub to: String,
    pub recipient_name: String,
    pub organization_name: String,
    pub inviter_name: String,
    pub role: MemberRole,
    /// Whether the invited email already belongs to an account.
    pub existing_account: bool,
    pub link: String,
}

impl InviteEmail {
    pub fn invitation_link(public_url: &str, token: &str) -> String {
        format!("{}/invitations/{}", public_url.trim_end_matches('/'), token)
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_organization_invite(&self, email: &InviteEmail) -> ServerResult<()>;
}

/// Writes outgoing mail to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_organization_invite(&self, email: &InviteEmail) -> ServerResult<()> {
        info!(
            to = %email.to,
            recipient = %email.recipient_name,
            organization = %email.organization_name,
            inviter = %email.inviter_name,
            role = %email.role,
            existing_account = email.existing_account,
            link = %email.link,
            "organization invite"
        );
        Ok(())
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Arc<dyn Mailer> {
    match config.mail_driver {
        MailDriver::Log => Arc::new(LogMailer),
    }
}
