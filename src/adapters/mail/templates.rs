/// Content of a call-to-action email: a greeting, one paragraph and a button.
#[derive(Debug, Clone)]
pub struct ActionEmail<'a> {
    pub title: &'a str,
    pub name: &'a str,
    pub message: &'a str,
    pub button_text: &'a str,
    pub url: &'a str,
}

impl ActionEmail<'_> {
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
  <head><meta charset="utf-8"><title>{title}</title></head>
  <body style="font-family: sans-serif; background: #f4f4f5; padding: 24px;">
    <div style="max-width: 480px; margin: 0 auto; background: #ffffff; border-radius: 8px; padding: 32px;">
      <h2>{title}</h2>
      <p>Hi {name},</p>
      <p>{message}</p>
      <p style="text-align: center; margin: 32px 0;">
        <a href="{url}" style="background: #4f46e5; color: #ffffff; padding: 12px 24px; border-radius: 6px; text-decoration: none;">{button_text}</a>
      </p>
      <p style="font-size: 12px; color: #71717a;">If the button does not work, open this link: {url}</p>
    </div>
  </body>
</html>"#,
            title = escape(self.title),
            name = escape(self.name),
            message = escape(self.message),
            button_text = escape(self.button_text),
            url = escape(self.url),
        )
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
