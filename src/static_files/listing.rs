//! HTML directory listings.

use std::fmt::Write as _;
use std::path::Path;

/// Whether `name` matches `[A-Za-z0-9][-_A-Za-z0-9.]*`.
pub fn is_listable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Render the listing of `dir`. Children that are hidden, unreadable, or
/// whose names fail [`is_listable_name`] are skipped; `..` always comes first.
pub async fn render_listing(dir: &Path) -> std::io::Result<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_listable_name(&name) {
            continue;
        }
        if is_readable(&entry.path()).await {
            names.push(name);
        }
    }
    names.sort();

    let title = dir.display();
    let mut page = String::with_capacity(256 + names.len() * 48);
    page.push_str("<!DOCTYPE html>\r\n");
    let _ = write!(
        page,
        "<html><head><title>Listing of: {title}</title></head><body>\r\n"
    );
    let _ = write!(page, "<h3>Listing of: {title}</h3>\r\n");
    page.push_str("<ul>");
    page.push_str("<li><a href=\"../\">..</a></li>\r\n");
    for name in &names {
        let _ = write!(page, "<li><a href=\"{name}\">{name}</a></li>\r\n");
    }
    page.push_str("</ul></body></html>\r\n");
    Ok(page)
}

/// A directory counts as readable when it can be listed, a file when it opens.
async fn is_readable(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::read_dir(path).await.is_ok(),
        Ok(_) => tokio::fs::File::open(path).await.is_ok(),
        Err(_) => false,
    }
}
