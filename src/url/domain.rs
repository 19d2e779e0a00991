use url::Url;

/// Extracts the host (with port, when present) from a URL
///
/// This is the value recorded as `host` in audit entries.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use pricetide::url::extract_host;
///
/// let url = Url::parse("https://Example.COM/path").unwrap();
/// assert_eq!(extract_host(&url), "example.com");
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(extract_host(&url), "127.0.0.1:8080");
/// ```
pub fn extract_host(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Extracts the path of a URL, defaulting to `/`
pub fn extract_path(url: &Url) -> String {
    match url.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    }
}

/// Returns the `scheme://host[:port]` origin of a URL
pub fn origin_of(url: &Url) -> String {
    format!("{}://{}", url.scheme(), extract_host(url))
}

/// Builds the robots.txt URL for the origin of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use pricetide::url::robots_url;
///
/// let url = Url::parse("https://shop.example.com/p/1?ref=x").unwrap();
/// assert_eq!(robots_url(&url), "https://shop.example.com/robots.txt");
/// ```
pub fn robots_url(url: &Url) -> String {
    format!("{}/robots.txt", origin_of(url))
}
