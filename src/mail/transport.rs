use lettre::{
    Message, SmtpTransport, Transport, message::header::ContentType, message::Mailbox,
    transport::smtp::authentication::Credentials,
};
use tracing::{info, warn};

use super::{Mail, MailTransport};
use crate::config::SmtpConfig;

/// Delivers through an SMTP relay using STARTTLS.
pub struct SmtpMailTransport {
    transport: SmtpTransport,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<SmtpMailTransport> {
        let mut builder = SmtpTransport::starttls_relay(&config.host)?.port(config.port);

        match (&config.user, &config.password) {
            (Some(user), Some(password)) => {
                builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
            }
            (None, None) => {}
            _ => warn!("SMTP user and password must be given together, connecting without authentication"),
        }

        info!("delivering mails through {}:{}", config.host, config.port);
        Ok(Self {
            transport: builder.build(),
        })
    }
}

impl MailTransport for SmtpMailTransport {
    fn deliver(&mut self, mail: &Mail) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(mail.sender.parse::<Mailbox>()?)
            .to(mail.recipient.parse::<Mailbox>()?)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())?;

        self.transport.send(&message)?;
        Ok(())
    }
}

/// Writes mails to the log instead of sending them. Used when no relay is
/// configured.
#[derive(Debug, Default)]
pub struct LogMailTransport;

impl MailTransport for LogMailTransport {
    fn deliver(&mut self, mail: &Mail) -> anyhow::Result<()> {
        info!(
            "mail to {} ({}):\n{}",
            mail.recipient, mail.subject, mail.body
        );
        Ok(())
    }
}
