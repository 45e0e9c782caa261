//! Test fixtures: build small ZIM bundles on disk / 测试夹具：构建小型ZIM包

use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;

/// Write a bundle with raw entries at explicit container paths
pub(crate) fn build_archive_entries(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("create archive file");
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (name, bytes) in entries {
        writer.start_file(name.to_string(), options).expect("start entry");
        writer.write_all(bytes).expect("write entry");
    }

    writer.finish().expect("finish archive");
}

/// Write a bundle from metadata keys, articles and redirects
pub(crate) fn build_archive(
    path: &Path,
    meta: &[(&str, &str)],
    articles: &[(&str, &str)],
    redirects: &[(&str, &str)],
) {
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    for (key, value) in meta {
        entries.push((format!("M/{}", key), value.as_bytes().to_vec()));
    }
    for (article_path, html) in articles {
        entries.push((format!("A/{}", article_path), html.as_bytes().to_vec()));
    }
    for (from, to) in redirects {
        entries.push((format!("R/{}", from), to.as_bytes().to_vec()));
    }

    let entries_ref: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
        .collect();
    build_archive_entries(path, &entries_ref);
}

/// Minimal HTML page with a title element
pub(crate) fn page(title: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body><p>{} body</p></body></html>",
        title, title
    )
}
