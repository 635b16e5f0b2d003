//! HTML rendering for the demo user pages.

use crate::types::User;

/// Render a user card with a link to the other demo user.
///
/// `suffix` keeps the link on the same route variant (empty, `/shared` or
/// `/direct`).
pub fn user_page(user: &User, suffix: &str) -> String {
    let other = if user.id == 1 { 2 } else { 1 };
    format!(
        concat!(
            "<!doctype html>\n",
            "<html><head><title>{name}</title></head><body>\n",
            "<main class=\"flex flex-col items-center justify-center h-screen w-full\">\n",
            "<h1 class=\"text-4xl font-bold\">{name}</h1>\n",
            "<p class=\"text-lg\">{email}</p>\n",
            "<a href=\"/users/{other}{suffix}\" class=\"underline mt-4\">Other User</a>\n",
            "</main>\n",
            "</body></html>\n"
        ),
        name = escape(&user.name),
        email = escape(&user.email),
        other = other,
        suffix = suffix,
    )
}

pub fn not_found_page() -> String {
    "<!doctype html>\n<html><body><div>User not found.</div></body></html>\n".to_string()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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
