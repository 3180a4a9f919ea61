//! Filename extraction from `Content-Disposition` headers.

/// Pick the download filename out of a `Content-Disposition` value.
///
/// `filename*=UTF-8''<percent-encoded>` wins over a plain `filename=`; quotes around the
/// plain form are stripped. Returns `None` when neither parameter yields a usable name.
pub fn filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in params(header) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "filename*" => extended = decode_extended(value),
            "filename" => plain = Some(unquote(value)),
            _ => {}
        }
    }

    extended
        .or(plain)
        .map(|name| sanitize(&name))
        .filter(|name| !name.is_empty())
}

/// Split on `;` outside quoted strings.
fn params(header: &str) -> impl Iterator<Item = &str> {
    let mut quoted = false;
    let mut escaped = false;
    header
        .split(move |c: char| {
            if escaped {
                escaped = false;
                return false;
            }
            match c {
                '\\' if quoted => escaped = true,
                '"' => quoted = !quoted,
                ';' => return !quoted,
                _ => {}
            }
            false
        })
        .map(str::trim)
}

/// Strip surrounding quotes and undo backslash escapes inside them.
fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `UTF-8''caf%C3%A9.wav` -> `café.wav`
fn decode_extended(value: &str) -> Option<String> {
    let (charset, rest) = value.split_once('\'')?;
    let (_language, encoded) = rest.split_once('\'')?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    urlencoding::decode(encoded.trim_matches('"'))
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Keep only the final path component.
fn sanitize(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_quoted_filename() {
        assert_eq!(
            filename(r#"attachment; filename="song [instrumental].wav""#),
            Some("song [instrumental].wav".to_string())
        );
    }

    #[test]
    fn test_plain_unquoted_filename() {
        assert_eq!(
            filename("attachment; filename=mix.wav"),
            Some("mix.wav".to_string())
        );
    }

    #[test]
    fn test_extended_filename_is_preferred() {
        let header = "attachment; filename=\"fallback.wav\"; filename*=UTF-8''%E6%9B%B2%20%5Bvocals%5D.wav";
        assert_eq!(filename(header), Some("曲 [vocals].wav".to_string()));
    }

    #[test]
    fn test_unknown_charset_falls_back_to_plain() {
        let header = "attachment; filename*=ISO-8859-1''caf%E9.wav; filename=\"cafe.wav\"";
        assert_eq!(filename(header), Some("cafe.wav".to_string()));
    }

    #[test]
    fn test_path_components_are_stripped() {
        assert_eq!(
            filename("attachment; filename=\"../../etc/passwd\""),
            Some("passwd".to_string())
        );
    }

    #[test]
    fn test_semicolon_inside_quotes() {
        assert_eq!(
            filename(r#"attachment; filename="live; remastered.wav"; size=10"#),
            Some("live; remastered.wav".to_string())
        );
        assert_eq!(
            filename(r#"attachment; filename="say \"hi\"; ok.wav""#),
            Some(r#"say "hi"; ok.wav"#.to_string())
        );
    }

    #[test]
    fn test_missing_filename() {
        assert_eq!(filename("attachment"), None);
        assert_eq!(filename("attachment; filename=\"\""), None);
    }
}
