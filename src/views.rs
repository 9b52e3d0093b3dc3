//! Minimal HTML rendering for the browser-facing pages.

use crate::models::{
    file::{FileView, MediaClass},
    query::SearchPage,
    user::UserView,
};

/// Escapes text for HTML bodies and attribute values.
pub fn escape(raw: &str) -> String {
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

pub fn layout(brand: &str, title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title} - {brand}</title>\
         <link rel=\"stylesheet\" href=\"/static/css/main.css\"></head>\
         <body><header><a href=\"/\">{brand}</a> <a href=\"/upload\">Upload</a> \
         <a href=\"/users\">Users</a> <a href=\"/logout\">Log out</a></header>\
         <main><h1>{title}</h1>{body}</main></body></html>",
        brand = escape(brand),
        title = escape(title),
        body = body,
    )
}

fn preview(file: &FileView) -> String {
    let url = escape(&file.url);
    match MediaClass::parse(file.class) {
        Some(MediaClass::Image) => format!("<img src=\"{}\" alt=\"{}\">", url, escape(&file.name)),
        Some(MediaClass::Video) => format!("<video src=\"{}\" controls></video>", url),
        Some(MediaClass::Audio) => format!("<audio src=\"{}\" controls></audio>", url),
        _ => format!(
            "<a href=\"{}\">{}.{}</a>",
            url,
            escape(&file.name),
            escape(&file.extension)
        ),
    }
}

fn pager(page: &SearchPage) -> String {
    let pages = page.total.div_ceil(page.results_per_page.max(1)).max(1);
    format!(
        "<p class=\"pager\">Page {} of {} ({} results)</p>",
        page.page, pages, page.total
    )
}

pub fn tiled(page: &SearchPage) -> String {
    let tiles: String = page
        .files
        .iter()
        .map(|f| format!("<div class=\"tile\" data-id=\"{}\">{}</div>", escape(&f.id), preview(f)))
        .collect();
    format!("<div class=\"tiles\">{}</div>{}", tiles, pager(page))
}

pub fn detailed(page: &SearchPage) -> String {
    let rows: String = page
        .files
        .iter()
        .map(|f| {
            format!(
                "<article data-id=\"{id}\">{preview}<dl>\
                 <dt>Description</dt><dd>{desc}</dd>\
                 <dt>Tags</dt><dd>{tags}</dd>\
                 <dt>People</dt><dd>{people}</dd>\
                 <dt>Date</dt><dd>{date}</dd>\
                 <dt>Uploaded by</dt><dd>{uploader}</dd></dl></article>",
                id = escape(&f.id),
                preview = preview(f),
                desc = escape(&f.description),
                tags = escape(&f.tags.join(", ")),
                people = escape(&f.people.join(", ")),
                date = escape(&f.date),
                uploader = escape(&f.uploader),
            )
        })
        .collect();
    format!("<div class=\"details\">{}</div>{}", rows, pager(page))
}

pub fn login_form(brand: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Log in - {brand}</title></head>\
         <body><h1>{brand}</h1><form method=\"post\" action=\"/login\">\
         <input type=\"email\" name=\"email\" placeholder=\"Email\">\
         <input type=\"password\" name=\"password\" placeholder=\"Password\">\
         <button type=\"submit\">Log in</button></form>\
         <p><a href=\"/reset\">Forgotten password?</a></p></body></html>",
        brand = escape(brand),
    )
}

pub fn reset_form(brand: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Reset - {brand}</title></head>\
         <body><h1>Reset password</h1>\
         <form method=\"post\" action=\"/reset/request\">\
         <input type=\"email\" name=\"email\"><button type=\"submit\">Send</button></form>\
         <form method=\"post\" action=\"/reset/confirm\">\
         <input type=\"email\" name=\"email\">\
         <input type=\"password\" name=\"temporary_password\">\
         <input type=\"password\" name=\"new_password\">\
         <button type=\"submit\">Set password</button></form></body></html>",
        brand = escape(brand),
    )
}

pub fn upload_body(staged: &[FileView]) -> String {
    let items: String = staged
        .iter()
        .map(|f| {
            format!(
                "<li data-id=\"{}\">{}<span>{}.{}</span></li>",
                escape(&f.id),
                preview(f),
                escape(&f.name),
                escape(&f.extension)
            )
        })
        .collect();
    format!(
        "<form method=\"post\" action=\"/upload/temp\" enctype=\"multipart/form-data\">\
         <input type=\"file\" name=\"file\"><button type=\"submit\">Stage</button></form>\
         <h2>Staged</h2><ul class=\"staged\">{}</ul>",
        items
    )
}

pub fn users_body(users: &[UserView]) -> String {
    let rows: String = users
        .iter()
        .map(|u| {
            format!(
                "<tr><td>{}</td><td>{} {}</td><td>{:?}</td><td>{:?}</td></tr>",
                escape(&u.username),
                escape(&u.forename),
                escape(&u.surname),
                u.account_type,
                u.state
            )
        })
        .collect();
    format!(
        "<table><tr><th>Username</th><th>Name</th><th>Account</th><th>Registration</th></tr>{}</table>",
        rows
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape("<b>\"Tom & Jerry's\"</b>"),
            "&lt;b&gt;&quot;Tom &amp; Jerry&#39;s&quot;&lt;/b&gt;"
        );
    }
}
