use super::MailKind;

/// A rendered message, ready for any transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub html: String,
}

/// Page on the web front end that consumes the token of each mail kind.
pub fn link_for(domain: &str, kind: MailKind, token: &str) -> String {
    let page = match kind {
        MailKind::Verify => "verifyemail",
        MailKind::Reset => "resetemail",
    };
    format!("{}/{}?token={}", domain.trim_end_matches('/'), page, token)
}

pub fn render(kind: MailKind, link: &str) -> Email {
    match kind {
        MailKind::Verify => Email {
            subject: "Verify your Loanverse email".into(),
            html: format!(
                "<p>Welcome to Loanverse!</p>\
                 <p>Click <a href=\"{link}\">here</a> to verify your email, \
                 or copy and paste the link below in your browser.</p>\
                 <p>{link}</p>\
                 <p>The link expires soon and works only once.</p>"
            ),
        },
        MailKind::Reset => Email {
            subject: "Reset your Loanverse password".into(),
            html: format!(
                "<p>A password reset was requested for your Loanverse account.</p>\
                 <p>Click <a href=\"{link}\">here</a> to choose a new password, \
                 or copy and paste the link below in your browser.</p>\
                 <p>{link}</p>\
                 <p>If you did not request this, ignore this email.</p>"
            ),
        },
    }
}
