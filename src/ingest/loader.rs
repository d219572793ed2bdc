//! 文档加载：纯文本、PDF、Word（docx）、网页
//!
//! 按扩展名（或 http/https 前缀）分派；每个来源产出一个带 `source` 元数据的 Chunk，切分交给上层。
//! 网页 HTML 用 html2text 提取可读文本，失败时退回简易去标签。

use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use html2text::from_read;
use regex::Regex;

use crate::ingest::IngestError;
use crate::memory::Chunk;

/// 支持的来源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Text,
    Pdf,
    Word,
    Web,
}

impl SourceKind {
    /// 根据文件名 / URL 判断类型；不支持时返回 None
    pub fn detect(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(Self::Web);
        }
        let ext = Path::new(&lower).extension()?.to_str()?.to_string();
        match ext.as_str() {
            "txt" | "md" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Word),
            _ => None,
        }
    }
}

/// 文件扩展名（含点），用于错误信息，如 ".png"
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

fn document(source: &str, text: String) -> Chunk {
    Chunk::new(
        format!("doc_{}", uuid::Uuid::new_v4().simple()),
        text,
        source,
    )
}

/// 从内存字节加载（上传文件无需落盘）
pub fn load_bytes(filename: &str, bytes: &[u8]) -> Result<Vec<Chunk>, IngestError> {
    let text = match SourceKind::detect(filename) {
        Some(SourceKind::Text) => String::from_utf8_lossy(bytes).into_owned(),
        Some(SourceKind::Pdf) => pdf_text(bytes)?,
        Some(SourceKind::Word) => docx_text(bytes)?,
        Some(SourceKind::Web) | None => {
            return Err(IngestError::UnsupportedSource(format!(
                "Unsupported file type: {}",
                extension_of(filename)
            )))
        }
    };
    let text = text.trim_start_matches('\u{FEFF}');
    if text.trim().is_empty() {
        tracing::warn!(filename, "document has no extractable text");
        return Ok(Vec::new());
    }
    Ok(vec![document(filename, text.to_string())])
}

/// 从本地路径加载
pub async fn load_path(path: &Path) -> Result<Vec<Chunk>, IngestError> {
    let name = path.to_string_lossy().into_owned();
    if SourceKind::detect(&name).is_none() {
        return Err(IngestError::UnsupportedSource(format!(
            "Unsupported file type or URL: {name}"
        )));
    }
    let bytes = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || load_bytes(&name, &bytes))
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(e.to_string())))?
}

/// 抓取网页并提取可读文本
pub async fn load_url(url: &str, timeout_secs: u64) -> Result<Vec<Chunk>, IngestError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| IngestError::Http(e.to_string()))?;
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| IngestError::Http(format!("Request failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(IngestError::Http(format!("HTTP {}", resp.status())));
    }
    let body = resp
        .text()
        .await
        .map_err(|e| IngestError::Http(format!("Read body: {e}")))?;
    let body = body.trim_start_matches('\u{FEFF}');
    let text = if looks_like_html(body) {
        html_to_text(body)
    } else {
        body.to_string()
    };
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![document(url, text)])
}

/// PDF 文本提取；pdf-extract 遇到畸形文件可能 panic，这里当作解析错误
fn pdf_text(bytes: &[u8]) -> Result<String, IngestError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(IngestError::Pdf(e.to_string())),
        Err(_) => Err(IngestError::Pdf("PDF parser panicked on malformed input".into())),
    }
}

/// DOCX 为 zip 包，正文在 word/document.xml；按段落 / 换行 / 制表符还原文本
fn docx_text(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| IngestError::Docx(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| IngestError::Docx(e.to_string()))?
        .read_to_string(&mut xml)?;
    docx_xml_to_text(&xml)
}

pub(crate) fn docx_xml_to_text(xml: &str) -> Result<String, IngestError> {
    let compile = |p: &str| Regex::new(p).map_err(|e| IngestError::Docx(e.to_string()));
    let paragraph = compile(r"</w:p>")?;
    let line_break = compile(r"<w:(br|cr)\s*/>")?;
    let tab = compile(r"<w:tab\s*/>")?;
    let tag = compile(r"<[^>]+>")?;

    let text = paragraph.replace_all(xml, "\n");
    let text = line_break.replace_all(&text, "\n");
    let text = tab.replace_all(&text, "\t");
    let text = tag.replace_all(&text, "");
    Ok(unescape_xml(&text).trim().to_string())
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head")))
}

fn html_to_text(html: &str) -> String {
    match from_read(html.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => strip_html_tags(html),
    }
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_detect_kinds() {
        assert_eq!(SourceKind::detect("notes.TXT"), Some(SourceKind::Text));
        assert_eq!(SourceKind::detect("readme.md"), Some(SourceKind::Text));
        assert_eq!(SourceKind::detect("lecture.pdf"), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::detect("essay.docx"), Some(SourceKind::Word));
        assert_eq!(SourceKind::detect("https://example.com/a"), Some(SourceKind::Web));
        assert_eq!(SourceKind::detect("image.png"), None);
        assert_eq!(SourceKind::detect("Makefile"), None);
    }

    #[test]
    fn test_load_text_bytes() {
        let chunks = load_bytes("notes.txt", "\u{FEFF}Photosynthesis converts light.".as_bytes()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Photosynthesis converts light.");
        assert_eq!(chunks[0].metadata.get("source").map(String::as_str), Some("notes.txt"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_bytes("image.png", b"\x89PNG").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedSource(ref m) if m == "Unsupported file type: .png"));
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(load_bytes("empty.txt", b"  \n ").unwrap().is_empty());
    }

    #[test]
    fn test_docx_paragraphs_and_entities() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Cells &amp; tissues</w:t></w:r></w:p><w:p><w:r><w:t>Mitosis</w:t><w:tab/><w:t>phase</w:t></w:r></w:p></w:body></w:document>"#;
        let chunks = load_bytes("bio.docx", &docx_bytes(xml)).unwrap();
        assert_eq!(chunks[0].text, "Cells & tissues\nMitosis\tphase");
    }

    #[test]
    fn test_corrupt_docx_and_pdf() {
        assert!(matches!(load_bytes("bad.docx", b"not a zip"), Err(IngestError::Docx(_))));
        assert!(matches!(load_bytes("bad.pdf", b"not a pdf"), Err(IngestError::Pdf(_))));
    }

    #[test]
    fn test_html_extraction() {
        assert!(looks_like_html("<!DOCTYPE html><html><body>x</body></html>"));
        assert!(!looks_like_html("plain words"));
        assert_eq!(strip_html_tags("<p>Hello   <b>world</b></p>"), "Hello world");
        let text = html_to_text("<html><body><h1>Title</h1><p>Body text</p></body></html>");
        assert!(text.contains("Title"));
        assert!(text.contains("Body text"));
    }

    #[tokio::test]
    async fn test_load_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter.md");
        std::fs::write(&path, "# Chapter 1\nCells.").unwrap();
        let chunks = load_path(&path).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("Cells."));

        let other = dir.path().join("data.csv");
        std::fs::write(&other, "a,b").unwrap();
        assert!(matches!(load_path(&other).await, Err(IngestError::UnsupportedSource(_))));
    }
}
