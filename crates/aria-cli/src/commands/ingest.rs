use std::path::Path;

use aria_config::AriaConfig;
use aria_core::{AriaError, FileUpload};

use super::wiring::{build_service, print_fragments, resolve_user};

pub(super) async fn cmd_ingest(
    config: AriaConfig,
    user: &str,
    path: &Path,
    mime: Option<String>,
) -> aria_core::Result<()> {
    let service = build_service(&config)?;
    let user = resolve_user(&service, user)?;

    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AriaError::validation("path", "not a file"))?;
    let mime = mime.unwrap_or_else(|| guess_mime(path).to_string());
    println!("Uploading {name} ({mime}, {} bytes)", bytes.len());

    let live = service.fanout().subscribe(user.id, print_fragments());
    let result = service.upload(user.id, FileUpload::new(name, mime, bytes)).await;
    service.unsubscribe(live);
    println!();

    let entry = result?;
    println!("Stored as memory #{} ({})", entry.id, entry.content);
    Ok(())
}

/// MIME type from the file extension.
fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
