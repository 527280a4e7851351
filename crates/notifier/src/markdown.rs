//! Telegram MarkdownV2 helpers
//!
//! See <https://core.telegram.org/bots/api#markdownv2-style>. Every
//! reserved character outside of intentional formatting must be escaped.

const RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape free text so it renders verbatim
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Inline link. Inside the URL only `)` and `\` need escaping.
pub fn link(text: &str, url: &str) -> String {
    let url = url.replace('\\', "\\\\").replace(')', "\\)");
    format!("[{}]({})", escape(text), url)
}

/// Bold text
pub fn bold(text: &str) -> String {
    format!("*{}*", escape(text))
}

/// Inline code
pub fn code(text: &str) -> String {
    format!("`{}`", text.replace('\\', "\\\\").replace('`', "\\`"))
}
