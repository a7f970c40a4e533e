use std::fmt;

/// Outbound email templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    ActivateAccount,
}

impl EmailTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::ActivateAccount => "activate_account",
        }
    }

    /// Render the HTML body.
    pub fn render(&self, user_name: &str, confirmation_url: &str, activation_code: &str) -> String {
        match self {
            EmailTemplate::ActivateAccount => format!(
                "<!DOCTYPE html>\n\
                 <html>\n\
                 <body>\n\
                 <p>Hello {user},</p>\n\
                 <p>Use the code below to activate your account. It is valid for a limited time.</p>\n\
                 <p style=\"font-size:24px;letter-spacing:4px\"><strong>{code}</strong></p>\n\
                 <p><a href=\"{url}\">Activate account</a></p>\n\
                 </body>\n\
                 </html>\n",
                user = escape_html(user_name),
                code = escape_html(activation_code),
                url = escape_html(confirmation_url),
            ),
        }
    }
}

impl fmt::Display for EmailTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
