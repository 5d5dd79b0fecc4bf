use url::form_urlencoded;
use url::Url;

/// Hosts the crawler is allowed to visit, either exactly or as a `*.<host>`
/// suffix match.
pub const ALLOWED_HOSTS: &[&str] = &[
    "ics.uci.edu",
    "cs.uci.edu",
    "informatics.uci.edu",
    "stat.uci.edu",
];

/// File extensions that never contain crawlable hypertext.
const BLOCKED_EXTENSIONS: &[&str] = &[
    "css", "js", "bmp", "gif", "jpg", "jpeg", "ico", "png", "tif", "tiff", "mid", "mp2", "mp3",
    "mp4", "wav", "avi", "mov", "mpeg", "ram", "m4v", "mkv", "ogg", "ogv", "pdf", "ps", "eps",
    "tex", "ppt", "pptx", "doc", "docx", "xls", "xlsx", "data", "dat", "exe", "bz2", "tar", "msi",
    "bin", "7z", "psd", "dmg", "iso", "epub", "dll", "cnf", "tgz", "sha1", "thmx", "mso", "arff",
    "rtf", "jar", "csv", "rm", "smil", "wmv", "swf", "wma", "zip", "rar", "gz", "mpg", "flv",
    "webm", "ttf", "otf", "woff", "woff2", "eot", "sql", "db", "sqlite", "mdb", "log", "bak",
    "tmp", "temp", "cache", "class", "pyc", "o", "so",
];

/// Normalize a URL into its canonical form:
/// - Remove the fragment
/// - Lowercase the scheme and host (the `url` crate does this on parse)
/// - Collapse duplicate slashes in the path
/// - Ensure a trailing slash exactly when the last segment has no extension
/// - Use `/` for an empty path
/// - Sort query parameters by (key, value) and re-serialize them
///
/// Returns `None` if the input cannot be parsed as an absolute URL.
pub fn normalize(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    parsed.set_fragment(None);

    let path = normalize_path(parsed.path());
    parsed.set_path(&path);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        let query = serializer.finish();
        parsed.set_query(Some(&query));
    }

    Some(parsed.to_string())
}

/// Collapse duplicate slashes and fix the path tail: directories (no
/// extension in the last segment) end with a slash, files do not.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(path.len() + 1);
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if !has_extension(segments[segments.len() - 1]) {
        out.push('/');
    }
    out
}

/// A segment "has an extension" when it contains a dot with a non-empty
/// stem and suffix, e.g. `index.html` but not `.hidden` or `archive.`.
fn has_extension(segment: &str) -> bool {
    match segment.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && !ext.is_empty(),
        None => false,
    }
}

/// Whether the URL lies inside the allowed host set and does not point at
/// a blocked file type. Expects (but does not require) canonical input.
pub fn is_valid(url: &str) -> bool {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    let host = match parsed.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return false,
    };

    let host_allowed = ALLOWED_HOSTS
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")));
    if !host_allowed {
        return false;
    }

    !has_blocked_extension(parsed.path())
}

fn has_blocked_extension(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or("");
    match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            BLOCKED_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// Hex MD5 digest of the canonical URL, used as the frontier primary key.
pub fn url_hash(url: &str) -> String {
    hex::encode(md5::compute(url.as_bytes()).0)
}
