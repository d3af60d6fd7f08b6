use std::sync::Arc;

pub const USERNAME_PLACEHOLDER: &str = "{username}";
pub const WEB_PORT_PLACEHOLDER: &str = "{userwebport}";
pub const SSH_PORT_PLACEHOLDER: &str = "{usersshport}";

/// Expands volume paths and external volume names for a tenant.
///
/// Deployments that name storage differently plug in their own implementation;
/// any `Fn(&str, &str) -> String` closure works as well.
pub trait VolumeNameFormatter: Send + Sync {
    fn format(&self, template: &str, tenant: &str) -> String;
}

pub type DynVolumeNameFormatter = Arc<dyn VolumeNameFormatter>;

/// Replaces `{username}` with the tenant name.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsernameFormatter;

impl VolumeNameFormatter for UsernameFormatter {
    fn format(&self, template: &str, tenant: &str) -> String {
        template.replace(USERNAME_PLACEHOLDER, tenant)
    }
}

impl<F> VolumeNameFormatter for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn format(&self, template: &str, tenant: &str) -> String {
        self(template, tenant)
    }
}

pub fn render_command(template: &str, tenant: &str, web_port: u16, ssh_port: u16) -> String {
    template
        .replace(USERNAME_PLACEHOLDER, tenant)
        .replace(WEB_PORT_PLACEHOLDER, &web_port.to_string())
        .replace(SSH_PORT_PLACEHOLDER, &ssh_port.to_string())
}
