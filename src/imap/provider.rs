use crate::model::ServerAddress;

const IMAPS_PORT: u16 = 993;

/// Well-known IMAP endpoints, used when a mailbox is configured without an
/// explicit server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapProvider {
    Gmail,
    Outlook,
    Yahoo,
    ICloud,
}

impl ImapProvider {
    pub fn from_email(email: &str) -> Self {
        let domain = email
            .rsplit('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        if domain.contains("outlook") || domain.contains("hotmail") || domain.contains("live.com")
        {
            Self::Outlook
        } else if domain.contains("yahoo") {
            Self::Yahoo
        } else if domain.contains("icloud") || domain.contains("me.com") || domain.contains("mac.com") {
            Self::ICloud
        } else {
            Self::Gmail
        }
    }

    pub fn host(self) -> &'static str {
        match self {
            Self::Gmail => "imap.gmail.com",
            Self::Outlook => "imap-mail.outlook.com",
            Self::Yahoo => "imap.mail.yahoo.com",
            Self::ICloud => "imap.mail.me.com",
        }
    }

    pub fn server(self) -> ServerAddress {
        ServerAddress {
            host: self.host().to_string(),
            port: IMAPS_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_domains() {
        assert_eq!(ImapProvider::from_email("a@hotmail.com"), ImapProvider::Outlook);
        assert_eq!(ImapProvider::from_email("a@yahoo.co.uk"), ImapProvider::Yahoo);
        assert_eq!(ImapProvider::from_email("a@me.com"), ImapProvider::ICloud);
        assert_eq!(
            ImapProvider::from_email("a@ICLOUD.COM").server(),
            ServerAddress {
                host: "imap.mail.me.com".into(),
                port: 993
            }
        );
    }

    #[test]
    fn unknown_domain_falls_back_to_gmail() {
        assert_eq!(ImapProvider::from_email("a@example.org"), ImapProvider::Gmail);
        assert_eq!(ImapProvider::from_email("no-at-sign"), ImapProvider::Gmail);
    }
}
