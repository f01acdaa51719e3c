use regex::Regex;

/// Strip HTML tags and decode the handful of entities the search API emits
/// in titles and descriptions.
pub fn clean_html(text: &str) -> String {
    let tags = Regex::new(r"<[^>]+>").unwrap();
    let stripped = tags.replace_all(text, "");
    stripped
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .trim()
        .to_string()
}
