use percent_encoding::percent_decode_str;

/// Get a substring between 2 strings. The second string is searched for after the first one.
pub fn str_between_str<'a>(full_str: &'a str, str1: &str, str2: &str) -> Option<&'a str> {
    let x = full_str.find(str1)? + str1.len();

    let y = x + full_str[x..].find(str2)?;

    Some(&full_str[x..y])
}

/// Final non-empty segment of a URL path, decoded. `/route/line%2033/` gives `line 33`.
pub fn last_path_segment(url: &reqwest::Url) -> Option<String> {
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
}
