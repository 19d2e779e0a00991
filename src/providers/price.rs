//! Text helpers shared by scraping providers

/// Parses a displayed price into cents
///
/// Currency symbols, the `USD` suffix and thousands separators are removed
/// before parsing. Unparseable input yields `0`, which callers treat as
/// "no price".
///
/// # Examples
///
/// ```
/// use pricetide::providers::parse_price;
///
/// assert_eq!(parse_price("$1,299.99"), 129999);
/// assert_eq!(parse_price("invalid"), 0);
/// ```
pub fn parse_price(text: &str) -> i64 {
    let cleaned: String = text
        .replace("USD", "")
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * 100.0).round() as i64,
        _ => 0,
    }
}

/// Guesses a brand from the first word of a product title
///
/// Returns `None` for single-word titles and for first words shorter than
/// 3 or longer than 19 characters.
pub fn extract_brand(title: &str) -> Option<String> {
    let mut words = title.split_whitespace();
    let first = words.next()?;
    words.next()?;

    let len = first.chars().count();
    if (3..20).contains(&len) {
        Some(first.to_string())
    } else {
        None
    }
}

/// Builds a URL path segment from a product title
///
/// Lowercases ASCII alphanumerics and joins runs of anything else with `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Reads an estimated delivery window in days from free text
///
/// Understands ranges such as `3-5 days` or `3 to 5 days`, a single
/// `5 days`, and anything mentioning weeks. Empty text yields `None`;
/// other text falls back to a 5-10 day window.
pub fn parse_delivery_days(text: &str) -> Option<(u32, u32)> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    let numbers: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|part| part.parse().ok())
        .collect();

    match numbers.as_slice() {
        [min, max, ..] if min <= max => Some((*min, *max)),
        [days] => Some((*days, *days)),
        _ if text.contains("week") => Some((7, 14)),
        _ => Some((5, 10)),
    }
}

/// Truncates a string to at most `max` characters
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
